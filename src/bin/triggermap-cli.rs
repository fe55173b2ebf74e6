use std::io::{self, Write};

use triggermap::client::{
    api::{ApiClient, ApiError, TriggerDto},
    session::SessionProvider,
    storage::FileStorage,
    wizard::{Wizard, WizardStep},
};

fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}

fn print_error(e: &ApiError) {
    println!("请求出错：{}", e.message);
    for field in &e.fields {
        println!("  - {}: {}", field.field, field.message);
    }
}

fn print_trigger(trigger: &TriggerDto) {
    println!("#{} {}", trigger.id, trigger.trigger_name);
    println!("  事件：{}", trigger.trigger_event);
    println!("  事实：{}", trigger.factual_description);
    println!("  情绪：{}", trigger.emotions.join("、"));
    println!("  强度：{}/10", trigger.intensity);
    println!("  解读：{}", trigger.meaning);
    println!("  历史关联：{}", trigger.past_relationship);
    println!("  记录于 {}", trigger.created_at.format("%Y-%m-%d %H:%M"));
}

async fn auth_menu(session: &mut SessionProvider<FileStorage, ApiClient>) -> bool {
    println!();
    println!("[1] 登录  [2] 注册  [q] 退出");
    match prompt("> ").as_str() {
        "1" => {
            let email = prompt("邮箱: ");
            let password = prompt("密码: ");
            match session.login(&email, &password).await {
                Ok(user) => println!("欢迎回来，{}！", user.username),
                Err(e) => print_error(&e),
            }
            true
        }
        "2" => {
            let username = prompt("用户名: ");
            let email = prompt("邮箱: ");
            let password = prompt("密码: ");
            match session.signup(&username, &email, &password).await {
                Ok(user) => println!("注册成功，欢迎加入，{}！", user.username),
                Err(e) => print_error(&e),
            }
            true
        }
        "q" => false,
        _ => true,
    }
}

/// 逐步走完多步表单；返回false表示用户中途退出
async fn run_wizard(
    session: &mut SessionProvider<FileStorage, ApiClient>,
    api: &ApiClient,
) -> bool {
    let Some(token) = session.token() else {
        println!("会话已失效，请重新登录");
        return true;
    };

    let mut wizard = Wizard::resume(session.storage_mut());
    if wizard.step() != WizardStep::Welcome {
        println!("检测到未完成的记录，已从第{}步继续（输入r可重新开始）", wizard.step().index());
    }

    loop {
        let input = match wizard.step() {
            WizardStep::Welcome => {
                println!();
                println!("欢迎使用触发日志 🌱");
                println!("记录触发你情绪的事件，觉察自己的反应模式。");
                prompt("按回车开始，输入q返回菜单: ")
            }
            WizardStep::TriggerEvent => {
                show_current(&wizard.answers().trigger_event);
                prompt("是什么触发了你？描述触发你反应的事件、话语或情境: ")
            }
            WizardStep::FactualDescription => {
                show_current(&wizard.answers().factual_description);
                prompt("只谈事实。不带解读与评判地描述发生了什么: ")
            }
            WizardStep::EmotionalResponse => {
                show_current(&wizard.answers().emotions.join("、"));
                prompt("当时涌现了哪些情绪？用顿号或逗号分隔（如：愤怒、羞耻）: ")
            }
            WizardStep::Intensity => {
                show_current(
                    &wizard
                        .answers()
                        .intensity
                        .map(|i| i.to_string())
                        .unwrap_or_default(),
                );
                prompt("这次反应的强度是多少？（1到10的整数）: ")
            }
            WizardStep::Meaning => {
                show_current(&wizard.answers().meaning);
                prompt("你给这件事赋予了什么含义？你对自己讲了什么故事: ")
            }
            WizardStep::HistoricalConnection => {
                show_current(&wizard.answers().past_relationship);
                prompt("它让你想起过去的哪段经历或关系？: ")
            }
            WizardStep::NameThisPattern => {
                show_current(&wizard.answers().trigger_name);
                prompt("给这个模式起一个好记的名字: ")
            }
            WizardStep::Result => String::new(),
        };

        match input.as_str() {
            "q" => return true,
            "r" => {
                wizard.reset();
                continue;
            }
            "b" => {
                wizard.back_step();
                continue;
            }
            _ => {}
        }

        // 空输入保留已有答案
        if !input.is_empty() {
            match wizard.step() {
                WizardStep::Welcome | WizardStep::Result => {}
                WizardStep::TriggerEvent => wizard.set_trigger_event(&input),
                WizardStep::FactualDescription => wizard.set_factual_description(&input),
                WizardStep::EmotionalResponse => {
                    let emotions = input
                        .split(['、', ',', '，'])
                        .map(|emotion| emotion.to_string())
                        .collect();
                    wizard.set_emotions(emotions);
                }
                WizardStep::Intensity => {
                    if let Ok(intensity) = input.parse::<i32>() {
                        wizard.set_intensity(intensity);
                    }
                }
                WizardStep::Meaning => wizard.set_meaning(&input),
                WizardStep::HistoricalConnection => wizard.set_past_relationship(&input),
                WizardStep::NameThisPattern => wizard.set_trigger_name(&input),
            }
        }

        if wizard.step() == WizardStep::Result {
            // 终态：提交进行中
            let request = match wizard.build_request() {
                Ok(request) => request,
                Err(msg) => {
                    println!("{}", msg);
                    wizard.retry();
                    continue;
                }
            };
            println!("正在保存……");
            match api.create_trigger(&token, &request).await {
                Ok(created) => {
                    wizard.finish();
                    println!("已保存！每一次记录都让你离情绪清明更近一步。");
                    print_trigger(&created);
                    return true;
                }
                Err(e) => {
                    print_error(&e);
                    println!("答案已保留，稍后可从头确认并重试。");
                    wizard.retry();
                    continue;
                }
            }
        }

        if let Err(msg) = wizard.next_step() {
            println!("{}", msg);
        }
    }
}

fn show_current(value: &str) {
    if !value.is_empty() {
        println!("（当前：{}，回车保留，b返回上一步）", value);
    } else {
        println!("（b返回上一步，q退出）");
    }
}

async fn main_menu(
    session: &mut SessionProvider<FileStorage, ApiClient>,
    api: &ApiClient,
) -> bool {
    let Some(token) = session.token() else {
        return true;
    };

    println!();
    if let Some(user) = session.user() {
        println!("已登录：{} <{}>", user.username, user.email);
    }
    println!("[1] 记录新的触发事件  [2] 记录列表  [3] 查看详情");
    println!("[4] 删除记录  [5] 写入示例数据  [6] 登出  [q] 退出");

    match prompt("> ").as_str() {
        "1" => {
            return run_wizard(session, api).await;
        }
        "2" => match api.list_triggers(&token, None).await {
            Ok(triggers) if triggers.is_empty() => {
                println!("还没有任何记录，从记录第一个触发事件开始吧。")
            }
            Ok(triggers) => {
                println!("你的触发日志（最新在前）：");
                for trigger in &triggers {
                    println!(
                        "  #{} {}（强度{}，{}）",
                        trigger.id,
                        trigger.trigger_name,
                        trigger.intensity,
                        trigger.created_at.format("%Y-%m-%d")
                    );
                }
            }
            Err(e) => print_error(&e),
        },
        "3" => {
            if let Ok(id) = prompt("记录编号: ").parse::<i32>() {
                match api.get_trigger(&token, id).await {
                    Ok(trigger) => print_trigger(&trigger),
                    Err(e) if e.status == 404 => println!("没有找到这条记录"),
                    Err(e) => print_error(&e),
                }
            }
        }
        "4" => {
            if let Ok(id) = prompt("要删除的记录编号: ").parse::<i32>() {
                match api.delete_trigger(&token, id).await {
                    Ok(trigger) => println!("已删除「{}」。疗愈是过程，不是终点。", trigger.trigger_name),
                    Err(e) if e.status == 404 => println!("没有找到这条记录"),
                    Err(e) => print_error(&e),
                }
            }
        }
        "5" => match api.seed(&token).await {
            Ok(triggers) => println!("已写入{}条示例记录", triggers.len()),
            Err(e) => print_error(&e),
        },
        "6" => {
            session.logout();
            println!("已登出，下次见！");
        }
        "q" => return false,
        _ => {}
    }
    true
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .init();

    let base_url = std::env::var("TRIGGERMAP_API_URL")
        .unwrap_or_else(|_| "http://localhost:3000/api".into());
    let api = ApiClient::new(base_url);
    let storage = FileStorage::open(FileStorage::default_path());
    let mut session = SessionProvider::new(storage, api.clone());

    println!("正在恢复会话……");
    session.hydrate().await;
    if let Some(e) = session.last_error() {
        println!("会话已失效，请重新登录（{}）", e.message);
    }

    loop {
        // 认证期间周期性校验服务端会话
        session.maybe_refresh().await;

        let keep_going = if session.is_authenticated() {
            main_menu(&mut session, &api).await
        } else {
            auth_menu(&mut session).await
        };
        if !keep_going {
            break;
        }
    }
}
