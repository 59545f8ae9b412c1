// ==========================================
// 染整车间生产流程引擎 - 成本计算器
// ==========================================
// 纯函数, 无状态, 不访问存储
// 规则: 每一步累加后都保留两位小数 (不是只在末尾取整)
// 规则: 数值异常一律钳到 0, 由调用方写 Cost Anomaly 履历
// ==========================================

use crate::domain::job::{JobRecord, MaterialLine};
use chrono::NaiveDateTime;
use serde::Serialize;

/// 保留两位小数 (四舍五入, 远离零)
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

/// 基础加工费 = 数量 × 单价
pub fn base_cost(qty: f64, rate: f64) -> f64 {
    round2(qty * rate)
}

// ==========================================
// 用水成本
// ==========================================

/// 用水成本计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct WaterCostOutcome {
    pub cost: f64,
    /// 被钳到 0 的原因, 正常时为 None
    pub anomaly: Option<String>,
}

/// 用水成本 = max(0, round2((closing - opening) / weight × factor))
///
/// # 参数
/// - `weight`: 客户来料重量, 缺失或为 0 时成本为 0
/// - `factor`: 用水成本系数 (配置项 water_cost_factor)
pub fn water_cost(opening: f64, closing: f64, weight: Option<f64>, factor: f64) -> WaterCostOutcome {
    let clamp = |reason: String| WaterCostOutcome {
        cost: 0.0,
        anomaly: Some(reason),
    };

    if !opening.is_finite() || !closing.is_finite() {
        return clamp(format!("读数非法: opening={}, closing={}", opening, closing));
    }
    let weight = match weight {
        Some(w) if w.is_finite() && w > 0.0 => w,
        other => return clamp(format!("来料重量缺失或非正: {:?}", other)),
    };
    if closing < opening {
        return clamp(format!("结束读数小于开始读数: opening={}, closing={}", opening, closing));
    }

    let cost = round2((closing - opening) / weight * factor);
    if !cost.is_finite() || cost < 0.0 {
        return clamp(format!("成本计算结果非法: {}", cost));
    }
    WaterCostOutcome { cost, anomaly: None }
}

// ==========================================
// 作业总成本
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub anchor: f64,
    pub water_cost: f64,
    pub chemical_cost: f64,
    pub dye_cost: f64,
    pub total_cost: f64,
}

fn sum_lines(lines: &[MaterialLine]) -> f64 {
    lines.iter().fold(0.0, |acc, line| round2(acc + line.cost))
}

/// 逐步累加: anchor → +water → +chemicals → +dyes, 每步两位小数
pub fn total_cost(anchor: f64, water: f64, chemicals: &[MaterialLine], dyes: &[MaterialLine]) -> CostBreakdown {
    let chemical_cost = sum_lines(chemicals);
    let dye_cost = sum_lines(dyes);

    let mut total = round2(anchor);
    total = round2(total + water);
    total = round2(total + chemical_cost);
    total = round2(total + dye_cost);

    CostBreakdown {
        anchor: round2(anchor),
        water_cost: round2(water),
        chemical_cost,
        dye_cost,
        total_cost: total,
    }
}

/// 按当前明细重算作业成本字段
pub fn recompute_job_cost(job: &mut JobRecord) -> CostBreakdown {
    let breakdown = total_cost(job.cost_anchor(), job.water_cost, &job.chemicals, &job.dyes);
    job.water_cost = breakdown.water_cost;
    job.chemical_cost = breakdown.chemical_cost;
    job.dye_cost = breakdown.dye_cost;
    job.total_cost = breakdown.total_cost;
    breakdown
}

// ==========================================
// 运行时长折算
// ==========================================

/// 单次运行区间折算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElapsedFold {
    pub minutes: f64,
    /// 时钟回拨 (now 早于 start)
    pub clock_anomaly: bool,
}

/// (now - start) 按毫秒折算为分钟, 两位小数; 负值钳到 0
pub fn elapsed_minutes(start: NaiveDateTime, now: NaiveDateTime) -> ElapsedFold {
    let millis = (now - start).num_milliseconds();
    if millis < 0 {
        return ElapsedFold {
            minutes: 0.0,
            clock_anomaly: true,
        };
    }
    ElapsedFold {
        minutes: round2(millis as f64 / 60_000.0),
        clock_anomaly: false,
    }
}
