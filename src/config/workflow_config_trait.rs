// ==========================================
// 染整车间生产流程引擎 - 流程配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// WorkflowConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait WorkflowConfigReader: Send + Sync {
    /// 获取用水成本系数
    ///
    /// # 默认值
    /// - 0.4
    async fn get_water_cost_factor(&self) -> Result<f64, Box<dyn Error + Send + Sync>>;

    /// 获取排队位唯一冲突的重试次数
    ///
    /// # 默认值
    /// - 3
    async fn get_queue_slot_retry_limit(&self) -> Result<u32, Box<dyn Error + Send + Sync>>;

    /// 获取无签名请求的履历操作人
    ///
    /// # 默认值
    /// - System
    async fn get_default_actor(&self) -> Result<String, Box<dyn Error + Send + Sync>>;
}
