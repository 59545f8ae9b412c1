// ==========================================
// 染整车间生产流程引擎 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合流程引擎所需的所有 Repository, 共享同一连接
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::repository::{
    AssignmentRepository, CustomerRepository, HistoryRepository, JobRecordRepository,
    MachineStatusRepository, WaterProcessRepository,
};

/// 流程引擎仓储集合
#[derive(Clone)]
pub struct WorkflowRepositories {
    /// 作业仓储
    pub job_repo: Arc<JobRecordRepository>,
    /// 用水计量仓储
    pub water_repo: Arc<WaterProcessRepository>,
    /// 客户来料仓储 (只读 + 回单号改名)
    pub customer_repo: Arc<CustomerRepository>,
    /// 操作人员分派仓储
    pub assignment_repo: Arc<AssignmentRepository>,
    /// 机台状态看板仓储
    pub machine_status_repo: Arc<MachineStatusRepository>,
    /// 履历查询仓储
    pub history_repo: Arc<HistoryRepository>,
}

impl WorkflowRepositories {
    /// 基于共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            job_repo: Arc::new(JobRecordRepository::new(conn.clone())),
            water_repo: Arc::new(WaterProcessRepository::new(conn.clone())),
            customer_repo: Arc::new(CustomerRepository::new(conn.clone())),
            assignment_repo: Arc::new(AssignmentRepository::new(conn.clone())),
            machine_status_repo: Arc::new(MachineStatusRepository::new(conn.clone())),
            history_repo: Arc::new(HistoryRepository::new(conn)),
        }
    }
}
