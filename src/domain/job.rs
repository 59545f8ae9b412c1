// ==========================================
// 染整车间生产流程引擎 - 作业领域模型
// ==========================================
// JobRecord: 一个作业占用 (机台, 日期, 排队序号) 一个位置
// 唯一约束: (machine_no, plan_date, order_no)、(base_receiver, cycle)
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::history::HistoryEntry;
use crate::domain::types::JobStatus;

// ==========================================
// JobRecord - 生产作业
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    // ===== 标识 =====
    pub job_id: String,
    pub receiver_no: String,   // 回单号 (显示用)
    pub base_receiver: String, // 回修链基准号
    pub cycle: i32,            // 回修代次, 从 1 开始
    pub machine_no: String,
    #[serde(rename = "date")]
    pub plan_date: NaiveDate, // 分派日期 (本地零点)
    pub order_no: Option<i32>, // 排队序号, 离开排队后为 None

    // ===== 数量与费率 =====
    pub qty: f64,
    pub rate: f64,

    // ===== 成本 =====
    pub base_cost: f64,
    pub carried_cost: Option<f64>, // 回修结转成本, 首代为 None
    pub water_cost: f64,
    pub chemical_cost: f64,
    pub dye_cost: f64,
    pub total_cost: f64,

    // ===== 进度 =====
    pub running_time_minutes: f64,
    pub status: JobStatus,
    pub operators: Vec<String>,

    // ===== 明细 =====
    pub chemicals: Vec<MaterialLine>,
    pub dyes: Vec<MaterialLine>,
    pub history: Vec<HistoryEntry>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl JobRecord {
    /// 成本累加的起点: 回修代次从结转成本开始, 首代从基础加工费开始
    pub fn cost_anchor(&self) -> f64 {
        self.carried_cost.unwrap_or(self.base_cost)
    }

    /// 是否分派给指定操作人员 (忽略大小写与首尾空白)
    pub fn is_assigned_to(&self, operator: &str) -> bool {
        let wanted = operator.trim();
        self.operators
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case(wanted))
    }

    /// 追加履历
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.updated_at = entry.timestamp;
        self.history.push(entry);
    }
}

// ==========================================
// MaterialLine - 助剂/染料明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialLine {
    pub name: String,
    pub qty: f64,
    pub cost: f64,
    pub added_at: NaiveDateTime,
}

// ==========================================
// ReceiverId - 回单号结构化表示
// ==========================================
// 回修号不再从显示串中反解, base + cycle 分字段存储
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiverId {
    pub base: String,
    pub cycle: i32,
}

/// 历史遗留的回修前缀
const LEGACY_PREFIXES: [&str; 2] = ["RP-", "RE-"];

impl ReceiverId {
    pub fn new(base: impl Into<String>, cycle: i32) -> Self {
        Self {
            base: base.into(),
            cycle,
        }
    }

    /// 去掉任意层数的 RP-/RE- 前缀 (大小写不敏感)
    pub fn normalize_base(raw: &str) -> String {
        let mut rest = raw.trim();
        loop {
            let stripped = LEGACY_PREFIXES.iter().find_map(|prefix| {
                rest.get(..prefix.len())
                    .filter(|head| head.eq_ignore_ascii_case(prefix))
                    .map(|_| &rest[prefix.len()..])
            });
            match stripped {
                Some(next) => rest = next.trim_start(),
                None => break,
            }
        }
        rest.to_string()
    }

    /// 从遗留显示串恢复 {base, cycle}
    ///
    /// 仅用于缺少结构化字段的旧数据: 去前缀后, 末尾 `-N` (N >= 2) 视为代次
    pub fn parse(display: &str) -> Self {
        let base = Self::normalize_base(display);
        if let Some((head, tail)) = base.rsplit_once('-') {
            if !head.is_empty() {
                if let Ok(cycle) = tail.parse::<i32>() {
                    if cycle >= 2 {
                        return Self::new(head, cycle);
                    }
                }
            }
        }
        Self::new(base, 1)
    }

    /// 回修代次的显示串
    pub fn display(&self) -> String {
        if self.cycle <= 1 {
            self.base.clone()
        } else {
            format!("{}-{}", self.base, self.cycle)
        }
    }
}
