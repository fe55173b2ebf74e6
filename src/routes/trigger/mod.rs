mod handler;
mod model;

pub use handler::{
    create_trigger, delete_trigger, get_trigger, list_triggers, seed_triggers, update_trigger,
};
