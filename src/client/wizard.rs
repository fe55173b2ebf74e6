use serde::{Deserialize, Serialize};

use crate::client::api::NewTriggerDto;
use crate::client::storage::{Storage, WIZARD_KEY};

/// 多步表单的步骤，顺序固定，只允许±1移动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardStep {
    Welcome,
    TriggerEvent,
    FactualDescription,
    EmotionalResponse,
    Intensity,
    Meaning,
    HistoricalConnection,
    NameThisPattern,
    Result,
}

impl WizardStep {
    pub fn index(self) -> u8 {
        match self {
            WizardStep::Welcome => 0,
            WizardStep::TriggerEvent => 1,
            WizardStep::FactualDescription => 2,
            WizardStep::EmotionalResponse => 3,
            WizardStep::Intensity => 4,
            WizardStep::Meaning => 5,
            WizardStep::HistoricalConnection => 6,
            WizardStep::NameThisPattern => 7,
            WizardStep::Result => 8,
        }
    }

    fn from_index(index: u8) -> Self {
        match index {
            1 => WizardStep::TriggerEvent,
            2 => WizardStep::FactualDescription,
            3 => WizardStep::EmotionalResponse,
            4 => WizardStep::Intensity,
            5 => WizardStep::Meaning,
            6 => WizardStep::HistoricalConnection,
            7 => WizardStep::NameThisPattern,
            8 => WizardStep::Result,
            _ => WizardStep::Welcome,
        }
    }

    fn next(self) -> Self {
        Self::from_index(self.index().saturating_add(1).min(8))
    }

    fn back(self) -> Self {
        Self::from_index(self.index().saturating_sub(1))
    }
}

/// 逐步累积的表单答案
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WizardAnswers {
    pub trigger_event: String,
    pub factual_description: String,
    pub emotions: Vec<String>,
    pub intensity: Option<i32>,
    pub meaning: String,
    pub past_relationship: String,
    pub trigger_name: String,
}

/// 写入持久化存储的进行中快照
#[derive(Debug, Serialize, Deserialize)]
struct WizardSnapshot {
    step: u8,
    answers: WizardAnswers,
}

#[derive(Debug)]
pub struct Wizard<S> {
    storage: S,
    step: WizardStep,
    answers: WizardAnswers,
}

impl<S: Storage> Wizard<S> {
    /// 从持久化快照恢复进行中的流程；没有快照则从头开始。
    /// 崩溃在提交中途时回到最后一个可交互步骤。
    pub fn resume(storage: S) -> Self {
        let snapshot: Option<WizardSnapshot> = storage
            .get(WIZARD_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok());

        let (step, answers) = match snapshot {
            Some(snapshot) => {
                let step = match WizardStep::from_index(snapshot.step) {
                    WizardStep::Result => WizardStep::NameThisPattern,
                    step => step,
                };
                (step, snapshot.answers)
            }
            None => (WizardStep::Welcome, WizardAnswers::default()),
        };

        Self { storage, step, answers }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn answers(&self) -> &WizardAnswers {
        &self.answers
    }

    pub fn set_trigger_event(&mut self, value: &str) {
        self.answers.trigger_event = value.trim().to_string();
    }

    pub fn set_factual_description(&mut self, value: &str) {
        self.answers.factual_description = value.trim().to_string();
    }

    pub fn set_emotions(&mut self, emotions: Vec<String>) {
        self.answers.emotions = emotions
            .into_iter()
            .map(|emotion| emotion.trim().to_string())
            .filter(|emotion| !emotion.is_empty())
            .collect();
    }

    pub fn set_intensity(&mut self, intensity: i32) {
        self.answers.intensity = Some(intensity);
    }

    pub fn set_meaning(&mut self, value: &str) {
        self.answers.meaning = value.trim().to_string();
    }

    pub fn set_past_relationship(&mut self, value: &str) {
        self.answers.past_relationship = value.trim().to_string();
    }

    pub fn set_trigger_name(&mut self, value: &str) {
        self.answers.trigger_name = value.trim().to_string();
    }

    /// 当前步骤的前进门槛；仅为客户端引导，服务端会重新校验
    pub fn validate_step(&self, step: WizardStep) -> Result<(), String> {
        let answers = &self.answers;
        match step {
            WizardStep::Welcome | WizardStep::Result => Ok(()),
            WizardStep::TriggerEvent => {
                if answers.trigger_event.trim().is_empty() {
                    Err("请描述触发你的事件".to_string())
                } else {
                    Ok(())
                }
            }
            WizardStep::FactualDescription => {
                if answers.factual_description.trim().is_empty() {
                    Err("请客观描述发生了什么".to_string())
                } else {
                    Ok(())
                }
            }
            WizardStep::EmotionalResponse => {
                if answers.emotions.is_empty() {
                    Err("请至少命名一种情绪".to_string())
                } else {
                    Ok(())
                }
            }
            WizardStep::Intensity => match answers.intensity {
                Some(intensity) if (1..=10).contains(&intensity) => Ok(()),
                _ => Err("强度必须是1到10之间的整数".to_string()),
            },
            WizardStep::Meaning => {
                if answers.meaning.trim().is_empty() {
                    Err("请写下你对这件事的解读".to_string())
                } else {
                    Ok(())
                }
            }
            WizardStep::HistoricalConnection => {
                if answers.past_relationship.trim().is_empty() {
                    Err("请写下它与过去经历的关联".to_string())
                } else {
                    Ok(())
                }
            }
            WizardStep::NameThisPattern => {
                if answers.trigger_name.trim().is_empty() {
                    Err("请为这个模式取一个名字".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// 前进一步；当前步骤未通过校验时拒绝。每次移动都写入快照。
    pub fn next_step(&mut self) -> Result<WizardStep, String> {
        self.validate_step(self.step)?;
        self.step = self.step.next();
        self.persist();
        Ok(self.step)
    }

    /// 后退一步，最早回到欢迎页
    pub fn back_step(&mut self) -> WizardStep {
        self.step = self.step.back();
        self.persist();
        self.step
    }

    /// 汇总所有答案为创建请求；任一步骤不完整则给出该步骤的提示
    pub fn build_request(&self) -> Result<NewTriggerDto, String> {
        for step in [
            WizardStep::TriggerEvent,
            WizardStep::FactualDescription,
            WizardStep::EmotionalResponse,
            WizardStep::Intensity,
            WizardStep::Meaning,
            WizardStep::HistoricalConnection,
            WizardStep::NameThisPattern,
        ] {
            self.validate_step(step)?;
        }

        Ok(NewTriggerDto {
            trigger_event: self.answers.trigger_event.clone(),
            factual_description: self.answers.factual_description.clone(),
            emotions: self.answers.emotions.clone(),
            meaning: self.answers.meaning.clone(),
            past_relationship: self.answers.past_relationship.clone(),
            trigger_name: self.answers.trigger_name.clone(),
            intensity: self.answers.intensity.unwrap_or_default(),
        })
    }

    /// 提交成功：快照只在此处或显式重置时清除
    pub fn finish(&mut self) {
        self.step = WizardStep::Result;
        self.storage.remove(WIZARD_KEY);
    }

    /// 提交失败后的重试入口：回到欢迎页但保留已填答案
    pub fn retry(&mut self) -> WizardStep {
        self.step = WizardStep::Welcome;
        self.persist();
        self.step
    }

    /// 显式重置：清空内存状态与持久化快照
    pub fn reset(&mut self) {
        self.step = WizardStep::Welcome;
        self.answers = WizardAnswers::default();
        self.storage.remove(WIZARD_KEY);
    }

    fn persist(&mut self) {
        let snapshot = WizardSnapshot {
            step: self.step.index(),
            answers: self.answers.clone(),
        };
        match serde_json::to_string(&snapshot) {
            Ok(raw) => self.storage.set(WIZARD_KEY, &raw),
            Err(e) => tracing::warn!("Failed to snapshot wizard state: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    fn answer_current(wizard: &mut Wizard<&mut MemoryStorage>) {
        let step = wizard.step();
        answer_step(wizard, step);
    }

    fn answer_step(wizard: &mut Wizard<&mut MemoryStorage>, step: WizardStep) {
        match step {
            WizardStep::TriggerEvent => wizard.set_trigger_event("E"),
            WizardStep::FactualDescription => wizard.set_factual_description("F"),
            WizardStep::EmotionalResponse => {
                wizard.set_emotions(vec!["anger".into(), "shame".into()])
            }
            WizardStep::Intensity => wizard.set_intensity(7),
            WizardStep::Meaning => wizard.set_meaning("M"),
            WizardStep::HistoricalConnection => wizard.set_past_relationship("P"),
            WizardStep::NameThisPattern => wizard.set_trigger_name("N"),
            WizardStep::Welcome | WizardStep::Result => {}
        }
    }

    #[test]
    fn fresh_wizard_starts_at_welcome() {
        let mut storage = MemoryStorage::new();
        let wizard = Wizard::resume(&mut storage);
        assert_eq!(wizard.step(), WizardStep::Welcome);
        assert_eq!(wizard.answers(), &WizardAnswers::default());
    }

    #[test]
    fn guard_blocks_forward_until_step_is_answered() {
        let mut storage = MemoryStorage::new();
        let mut wizard = Wizard::resume(&mut storage);

        wizard.next_step().unwrap(); // Welcome没有门槛
        assert_eq!(wizard.step(), WizardStep::TriggerEvent);

        assert!(wizard.next_step().is_err());
        assert_eq!(wizard.step(), WizardStep::TriggerEvent);

        wizard.set_trigger_event("   ");
        assert!(wizard.next_step().is_err());

        wizard.set_trigger_event("同事否定了我的方案");
        assert_eq!(wizard.next_step().unwrap(), WizardStep::FactualDescription);
    }

    #[test]
    fn intensity_guard_rejects_out_of_range() {
        let mut storage = MemoryStorage::new();
        let mut wizard = Wizard::resume(&mut storage);
        for _ in 0..4 {
            answer_current(&mut wizard);
            wizard.next_step().unwrap();
        }
        assert_eq!(wizard.step(), WizardStep::Intensity);

        for bad in [0, 11, -1] {
            wizard.set_intensity(bad);
            assert!(wizard.next_step().is_err());
        }
        wizard.set_intensity(10);
        assert_eq!(wizard.next_step().unwrap(), WizardStep::Meaning);
    }

    #[test]
    fn back_step_stops_at_welcome() {
        let mut storage = MemoryStorage::new();
        let mut wizard = Wizard::resume(&mut storage);
        assert_eq!(wizard.back_step(), WizardStep::Welcome);

        wizard.next_step().unwrap();
        assert_eq!(wizard.back_step(), WizardStep::Welcome);
    }

    #[test]
    fn full_walk_builds_request() {
        let mut storage = MemoryStorage::new();
        let mut wizard = Wizard::resume(&mut storage);

        while wizard.step() != WizardStep::NameThisPattern {
            answer_current(&mut wizard);
            wizard.next_step().unwrap();
        }
        answer_step(&mut wizard, WizardStep::NameThisPattern);

        let request = wizard.build_request().unwrap();
        assert_eq!(request.trigger_event, "E");
        assert_eq!(request.emotions, vec!["anger".to_string(), "shame".to_string()]);
        assert_eq!(request.intensity, 7);
        assert_eq!(request.trigger_name, "N");
    }

    #[test]
    fn build_request_names_first_incomplete_step() {
        let mut storage = MemoryStorage::new();
        let mut wizard = Wizard::resume(&mut storage);
        wizard.set_trigger_event("E");

        let err = wizard.build_request().unwrap_err();
        assert_eq!(err, "请客观描述发生了什么");
    }

    #[test]
    fn snapshot_restores_answers_and_step_after_reload() {
        let mut storage = MemoryStorage::new();

        {
            let mut wizard = Wizard::resume(&mut storage);
            // 回答前三步后模拟页面刷新
            for _ in 0..4 {
                answer_current(&mut wizard);
                wizard.next_step().unwrap();
            }
            assert_eq!(wizard.step(), WizardStep::Intensity);
        }

        let wizard = Wizard::resume(&mut storage);
        assert_eq!(wizard.step(), WizardStep::Intensity);
        assert_eq!(wizard.answers().trigger_event, "E");
        assert_eq!(wizard.answers().factual_description, "F");
        assert_eq!(
            wizard.answers().emotions,
            vec!["anger".to_string(), "shame".to_string()]
        );
        assert_eq!(wizard.answers().intensity, None);
    }

    #[test]
    fn finish_clears_snapshot() {
        let mut storage = MemoryStorage::new();

        {
            let mut wizard = Wizard::resume(&mut storage);
            while wizard.step() != WizardStep::NameThisPattern {
                answer_current(&mut wizard);
                wizard.next_step().unwrap();
            }
            answer_step(&mut wizard, WizardStep::NameThisPattern);
            wizard.next_step().unwrap();
            assert_eq!(wizard.step(), WizardStep::Result);
            wizard.finish();
        }

        assert_eq!(storage.get(WIZARD_KEY), None);
        let wizard = Wizard::resume(&mut storage);
        assert_eq!(wizard.step(), WizardStep::Welcome);
    }

    #[test]
    fn retry_returns_to_welcome_keeping_answers() {
        let mut storage = MemoryStorage::new();
        let mut wizard = Wizard::resume(&mut storage);
        while wizard.step() != WizardStep::NameThisPattern {
            answer_current(&mut wizard);
            wizard.next_step().unwrap();
        }
        answer_step(&mut wizard, WizardStep::NameThisPattern);
        wizard.next_step().unwrap();

        assert_eq!(wizard.retry(), WizardStep::Welcome);
        assert_eq!(wizard.answers().trigger_name, "N");
        // 快照仍在，刷新后还能继续
        assert!(storage.get(WIZARD_KEY).is_some());
    }

    #[test]
    fn reset_clears_state_and_snapshot() {
        let mut storage = MemoryStorage::new();
        let mut wizard = Wizard::resume(&mut storage);
        answer_step(&mut wizard, WizardStep::TriggerEvent);
        wizard.next_step().unwrap();
        wizard.next_step().unwrap();

        wizard.reset();
        assert_eq!(wizard.step(), WizardStep::Welcome);
        assert_eq!(wizard.answers(), &WizardAnswers::default());
        assert_eq!(storage.get(WIZARD_KEY), None);
    }

    #[test]
    fn mid_submit_snapshot_resumes_at_last_interactive_step() {
        let mut storage = MemoryStorage::new();
        {
            let mut wizard = Wizard::resume(&mut storage);
            while wizard.step() != WizardStep::NameThisPattern {
                answer_current(&mut wizard);
                wizard.next_step().unwrap();
            }
            answer_step(&mut wizard, WizardStep::NameThisPattern);
            wizard.next_step().unwrap();
            assert_eq!(wizard.step(), WizardStep::Result);
            // 未调用finish：模拟提交途中进程退出
        }

        let wizard = Wizard::resume(&mut storage);
        assert_eq!(wizard.step(), WizardStep::NameThisPattern);
    }
}
