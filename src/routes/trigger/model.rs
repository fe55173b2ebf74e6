use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::utils::FieldError;

/// triggers表的一行
#[derive(Debug, Clone, FromRow)]
pub struct TriggerRow {
    pub id: i32,
    pub user_id: i32,
    pub trigger_event: String,
    pub factual_description: String,
    pub emotions: String,
    pub meaning: String,
    pub past_relationship: String,
    pub trigger_name: String,
    pub intensity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 触发记录（响应），情绪已解码为字符串数组
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub id: i32,
    pub trigger_event: String,
    pub factual_description: String,
    pub emotions: Vec<String>,
    pub meaning: String,
    pub past_relationship: String,
    pub trigger_name: String,
    pub intensity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TriggerRow> for TriggerInfo {
    fn from(row: TriggerRow) -> Self {
        TriggerInfo {
            id: row.id,
            trigger_event: row.trigger_event,
            factual_description: row.factual_description,
            emotions: decode_emotions(&row.emotions),
            meaning: row.meaning,
            past_relationship: row.past_relationship,
            trigger_name: row.trigger_name,
            intensity: row.intensity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub fn encode_emotions(emotions: &[String]) -> String {
    serde_json::to_string(emotions).unwrap_or_else(|_| "[]".to_string())
}

/// 存储值损坏时解码为空列表，读取永不失败
pub fn decode_emotions(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// 通过边界校验后的完整新记录
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrigger {
    pub trigger_event: String,
    pub factual_description: String,
    pub emotions: Vec<String>,
    pub meaning: String,
    pub past_relationship: String,
    pub trigger_name: String,
    pub intensity: i32,
}

/// 部分更新，None表示保留原值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerPatch {
    pub trigger_event: Option<String>,
    pub factual_description: Option<String>,
    pub emotions: Option<Vec<String>>,
    pub meaning: Option<String>,
    pub past_relationship: Option<String>,
    pub trigger_name: Option<String>,
    pub intensity: Option<i32>,
}

fn parse_text(value: &Value, field: &str, errors: &mut Vec<FieldError>) -> Option<String> {
    match value.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) => {
            errors.push(FieldError::new(field, "不能为空"));
            None
        }
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new(field, "必须是字符串"));
            None
        }
    }
}

fn parse_emotions(value: &Value, errors: &mut Vec<FieldError>) -> Option<Vec<String>> {
    match value.get("emotions") {
        Some(Value::Array(items)) => {
            let mut emotions = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => emotions.push(s.trim().to_string()),
                    _ => {
                        errors.push(FieldError::new("emotions", "必须是非空字符串的数组"));
                        return None;
                    }
                }
            }
            Some(emotions)
        }
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new("emotions", "必须是非空字符串的数组"));
            None
        }
    }
}

fn parse_intensity(value: &Value, errors: &mut Vec<FieldError>) -> Option<i32> {
    match value.get("intensity") {
        Some(Value::Null) | None => None,
        Some(v) => match v.as_i64() {
            Some(n) if (1..=10).contains(&n) => Some(n as i32),
            _ => {
                errors.push(FieldError::new("intensity", "必须是1到10之间的整数"));
                None
            }
        },
    }
}

impl NewTrigger {
    /// 边界校验：要么得到完整类型化的记录，要么得到逐字段错误
    pub fn from_value(value: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();

        let trigger_event = parse_text(value, "trigger_event", &mut errors);
        let factual_description = parse_text(value, "factual_description", &mut errors);
        let meaning = parse_text(value, "meaning", &mut errors);
        let past_relationship = parse_text(value, "past_relationship", &mut errors);
        let trigger_name = parse_text(value, "trigger_name", &mut errors);
        let emotions = parse_emotions(value, &mut errors);
        let intensity = parse_intensity(value, &mut errors);

        // 创建时每个字段都是必填的，缺省与显式null同样视为缺失
        for (field, missing) in [
            ("trigger_event", trigger_event.is_none()),
            ("factual_description", factual_description.is_none()),
            ("emotions", emotions.is_none()),
            ("meaning", meaning.is_none()),
            ("past_relationship", past_relationship.is_none()),
            ("trigger_name", trigger_name.is_none()),
            ("intensity", intensity.is_none()),
        ] {
            if missing && !errors.iter().any(|e| e.field == field) {
                errors.push(FieldError::new(field, "缺少必填字段"));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewTrigger {
            trigger_event: trigger_event.expect("validated"),
            factual_description: factual_description.expect("validated"),
            emotions: emotions.expect("validated"),
            meaning: meaning.expect("validated"),
            past_relationship: past_relationship.expect("validated"),
            trigger_name: trigger_name.expect("validated"),
            intensity: intensity.expect("validated"),
        })
    }
}

impl TriggerPatch {
    /// 每个字段都可缺省；提供了的字段必须通过与创建时相同的校验
    pub fn from_value(value: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();

        let trigger_event = parse_text(value, "trigger_event", &mut errors);
        let factual_description = parse_text(value, "factual_description", &mut errors);
        let meaning = parse_text(value, "meaning", &mut errors);
        let past_relationship = parse_text(value, "past_relationship", &mut errors);
        let trigger_name = parse_text(value, "trigger_name", &mut errors);
        let emotions = parse_emotions(value, &mut errors);
        let intensity = parse_intensity(value, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(TriggerPatch {
            trigger_event,
            factual_description,
            emotions,
            meaning,
            past_relationship,
            trigger_name,
            intensity,
        })
    }
}

const TRIGGER_COLUMNS: &str = "id, user_id, trigger_event, factual_description, emotions, \
     meaning, past_relationship, trigger_name, intensity, created_at, updated_at";

// 种子数据：固定的一批示例记录
const SEED_TRIGGERS: [(&str, &str, &[&str], &str, &str, &str, i32); 5] = [
    (
        "同事在会议上当众否定了我的方案",
        "周会上我介绍了新的排期方案，小李说这个方案不可行，随后大家转向了别的话题",
        &["愤怒", "羞耻"],
        "我觉得自己在所有人面前显得无能",
        "小时候在课堂上答错问题被全班嘲笑",
        "当众被否定",
        7,
    ),
    (
        "消息发出去很久对方没有回复",
        "下午三点给朋友发了条消息，到晚上十点仍然显示未读",
        &["焦虑", "不安"],
        "我认定对方不再在乎我了",
        "前一段关系的结束也是从不回消息开始的",
        "已读不回恐慌",
        5,
    ),
    (
        "计划好的聚会被临时取消",
        "约好周六的聚餐，对方周五晚上发消息说有事来不了",
        &["失望", "孤独"],
        "我觉得自己总是不被放在优先位置",
        "父母经常答应带我出去玩又临时反悔",
        "被放鸽子",
        4,
    ),
    (
        "伴侣忘记了我们的纪念日",
        "纪念日当天对方如常上班回家，完全没有提起",
        &["伤心", "委屈"],
        "我把这理解为我对他不重要",
        "家里从来不庆祝我的生日",
        "被遗忘的日子",
        8,
    ),
    (
        "上级深夜发来工作消息",
        "晚上十一点收到上级的消息，要求明早之前给出数据",
        &["烦躁", "无力"],
        "我觉得自己的时间完全不属于自己",
        "学生时代被家长随时检查作业",
        "边界被侵犯",
        6,
    ),
];

impl TriggerRow {
    /// 按用户倒序列出记录，过滤历史脏数据行
    pub async fn list(pool: &PgPool, user_id: i32, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TriggerRow>(&format!(
            r#"
            SELECT {TRIGGER_COLUMNS}
            FROM triggers
            WHERE user_id = $1
              AND trigger_event IS NOT NULL
              AND factual_description IS NOT NULL
              AND emotions IS NOT NULL
              AND meaning IS NOT NULL
              AND past_relationship IS NOT NULL
              AND trigger_name IS NOT NULL
              AND intensity IS NOT NULL
            ORDER BY id DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn create(
        pool: &PgPool,
        user_id: i32,
        new: &NewTrigger,
    ) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, TriggerRow>(&format!(
            r#"
            INSERT INTO triggers
                (user_id, trigger_event, factual_description, emotions,
                 meaning, past_relationship, trigger_name, intensity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TRIGGER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&new.trigger_event)
        .bind(&new.factual_description)
        .bind(encode_emotions(&new.emotions))
        .bind(&new.meaning)
        .bind(&new.past_relationship)
        .bind(&new.trigger_name)
        .bind(new.intensity)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// 仅在记录属于调用者时返回，否则视为不存在
    pub async fn find_by_id(
        pool: &PgPool,
        user_id: i32,
        id: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, TriggerRow>(&format!(
            r#"
            SELECT {TRIGGER_COLUMNS}
            FROM triggers
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// 未提供的字段通过COALESCE保留原值
    pub async fn update(
        pool: &PgPool,
        user_id: i32,
        id: i32,
        patch: &TriggerPatch,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, TriggerRow>(&format!(
            r#"
            UPDATE triggers
            SET trigger_event = COALESCE($3, trigger_event),
                factual_description = COALESCE($4, factual_description),
                emotions = COALESCE($5, emotions),
                meaning = COALESCE($6, meaning),
                past_relationship = COALESCE($7, past_relationship),
                trigger_name = COALESCE($8, trigger_name),
                intensity = COALESCE($9, intensity),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {TRIGGER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(patch.trigger_event.as_deref())
        .bind(patch.factual_description.as_deref())
        .bind(patch.emotions.as_ref().map(|e| encode_emotions(e)))
        .bind(patch.meaning.as_deref())
        .bind(patch.past_relationship.as_deref())
        .bind(patch.trigger_name.as_deref())
        .bind(patch.intensity)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// 删除是永久的，返回被删除的记录
    pub async fn delete(
        pool: &PgPool,
        user_id: i32,
        id: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, TriggerRow>(&format!(
            r#"
            DELETE FROM triggers
            WHERE id = $1 AND user_id = $2
            RETURNING {TRIGGER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// 整批写入示例数据，任一失败则整体回滚
    pub async fn seed(pool: &PgPool, user_id: i32) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut rows = Vec::with_capacity(SEED_TRIGGERS.len());

        for (event, facts, emotions, meaning, past, name, intensity) in SEED_TRIGGERS {
            let emotions: Vec<String> = emotions.iter().map(|e| e.to_string()).collect();
            let row = sqlx::query_as::<_, TriggerRow>(&format!(
                r#"
                INSERT INTO triggers
                    (user_id, trigger_event, factual_description, emotions,
                     meaning, past_relationship, trigger_name, intensity)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {TRIGGER_COLUMNS}
                "#
            ))
            .bind(user_id)
            .bind(event)
            .bind(facts)
            .bind(encode_emotions(&emotions))
            .bind(meaning)
            .bind(past)
            .bind(name)
            .bind(intensity)
            .fetch_one(&mut *tx)
            .await?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }
}
