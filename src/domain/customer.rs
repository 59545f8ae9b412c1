// ==========================================
// 染整车间生产流程引擎 - 客户来料信息
// ==========================================
// 外部协作方: 本引擎只读取 weight, 仅在回修时改写 receiver_no
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    pub customer_id: String,
    pub company_name: String,
    pub customer_name: Option<String>,
    pub receiver_no: String,
    pub party_dc_no: Option<String>,
    pub color: Option<String>,
    pub weight: Option<f64>, // 用水成本公式的除数
    pub date: Option<NaiveDate>,
}
