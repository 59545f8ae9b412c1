// ==========================================
// 染整车间生产流程引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 共享: 全部仓储共用同一 SQLite 连接
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{JobApi, QueueApi, WaterApi};
use crate::app::auth::TokenVerifier;
use crate::config::{ConfigManager, WorkflowSettings};
use crate::db::{init_schema, open_sqlite_connection, read_schema_version};
use crate::engine::{AssignmentView, JobLifecycle, MachineQueue, ReprocessEngine, WorkflowRepositories};

/// 应用状态
///
/// 包含所有API实例和共享资源, 作为 axum 路由状态
#[derive(Clone)]
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 作业API
    pub job_api: Arc<JobApi>,

    /// 用水计量API
    pub water_api: Arc<WaterApi>,

    /// 机台排队API
    pub queue_api: Arc<QueueApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 启动时加载的运行参数
    pub settings: WorkflowSettings,

    /// 令牌校验器
    pub token_verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - token_verifier: 令牌校验器
    ///
    /// # 返回
    /// - Ok(AppState): 成功创建
    /// - Err(String): 创建失败的错误信息
    pub async fn new(db_path: String, token_verifier: Arc<dyn TokenVerifier>) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("无法初始化数据库结构: {}", e))?;
        let schema_version = read_schema_version(&conn).map_err(|e| format!("无法读取schema版本: {}", e))?;
        tracing::info!(schema_version = ?schema_version, "数据库结构已就绪");

        Self::from_connection(db_path, Arc::new(Mutex::new(conn)), token_verifier).await
    }

    /// 基于已建表的共享连接组装
    pub async fn from_connection(
        db_path: String,
        conn: Arc<Mutex<Connection>>,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Self, String> {
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone()).map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settings = config_manager
            .load_settings()
            .await
            .map_err(|e| format!("无法加载运行参数: {}", e))?;
        tracing::info!(
            water_cost_factor = settings.water_cost_factor,
            queue_slot_retry_limit = settings.queue_slot_retry_limit,
            "运行参数已加载"
        );

        // ==========================================
        // 引擎层
        // ==========================================
        let repos = WorkflowRepositories::from_connection(conn);
        let queue = Arc::new(MachineQueue::new(repos.job_repo.clone(), settings.queue_slot_retry_limit));
        let lifecycle = Arc::new(JobLifecycle::new(repos.clone(), queue.clone(), settings.clone()));
        let reprocess_engine = Arc::new(ReprocessEngine::new(repos.clone(), queue.clone(), lifecycle.clone()));
        let assignment_view = Arc::new(AssignmentView::new(
            repos.job_repo.clone(),
            repos.assignment_repo.clone(),
            queue.clone(),
            lifecycle.clone(),
        ));

        // ==========================================
        // API层
        // ==========================================
        let job_api = Arc::new(JobApi::new(repos.clone(), lifecycle.clone(), reprocess_engine));
        let water_api = Arc::new(WaterApi::new(repos.clone(), lifecycle));
        let queue_api = Arc::new(QueueApi::new(repos, queue, assignment_view));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            job_api,
            water_api,
            queue_api,
            config_manager,
            settings,
            token_verifier,
        })
    }
}
