// ==========================================
// 操作人员待办与物料追加集成测试
// ==========================================
// 测试目标: 待办视图可见性、共用机台的 canStart、助剂/染料成本归集、修改履历
// ==========================================


use dyehouse_workflow::api::{ApiError, JobQuery, MaterialRequest, StartRequest, UpdateJobRequest};
use dyehouse_workflow::domain::history_actions;
use test_helpers::*;

fn material(name: &str, cost: f64) -> MaterialRequest {
    MaterialRequest {
        name: name.to_string(),
        qty: 1.0,
        cost,
    }
}

#[test]
fn test_operator_sees_own_queue_with_single_startable() {
    let env = setup_env();
    for receiver in ["OV-1", "OV-2", "OV-3"] {
        seed_customer(&env.repos, receiver, Some(20.0));
        env.job_api
            .create_job(&owner(), create_request(receiver, "M1", None), t0())
            .unwrap();
    }

    let items = env
        .queue_api
        .operator_queue(&operator("Ravi"), None, plan_date(), t0())
        .unwrap();
    assert_eq!(items.len(), 3);
    let startable: Vec<&str> = items
        .iter()
        .filter(|item| item.can_start)
        .map(|item| item.job.receiver_no.as_str())
        .collect();
    assert_eq!(startable, vec!["OV-1"]);

    // 未分派的人员待办为空
    let empty = env
        .queue_api
        .operator_queue(&operator("Kumar"), None, plan_date(), t0())
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_shared_machine_can_start_follows_queue_head() {
    let env = setup_env();
    seed_customer(&env.repos, "SM-1", Some(20.0));
    seed_customer(&env.repos, "SM-2", Some(20.0));
    let mut first = create_request("SM-1", "M1", Some(1));
    first.operators = vec!["Kumar".to_string()];
    env.job_api.create_job(&owner(), first, t0()).unwrap();
    env.job_api
        .create_job(&owner(), create_request("SM-2", "M1", Some(2)), t0())
        .unwrap();

    // Ravi 只有 2 号位, 机台队首属于 Kumar
    let ravi = env
        .queue_api
        .operator_queue(&operator("Ravi"), None, plan_date(), t0())
        .unwrap();
    assert_eq!(ravi.len(), 1);
    assert!(!ravi[0].can_start);
    let kumar = env
        .queue_api
        .operator_queue(&operator("Kumar"), None, plan_date(), t0())
        .unwrap();
    assert!(kumar[0].can_start);

    env.water_api
        .start(
            &operator("Kumar"),
            StartRequest {
                receiver_number: "SM-1".to_string(),
                opening_reading: 0.0,
            },
            at_minutes(1),
        )
        .unwrap();
    let ravi = env
        .queue_api
        .operator_queue(&operator("Ravi"), None, plan_date(), at_minutes(2))
        .unwrap();
    assert!(ravi[0].can_start);
}

#[test]
fn test_operator_cannot_view_others_queue() {
    let env = setup_env();
    seed_customer(&env.repos, "OV-9", Some(20.0));
    env.job_api
        .create_job(&owner(), create_request("OV-9", "M1", None), t0())
        .unwrap();

    let peek = env
        .queue_api
        .operator_queue(&operator("Kumar"), Some("Ravi"), plan_date(), t0());
    assert!(matches!(peek, Err(ApiError::Forbidden(_))));

    let by_manager = env
        .queue_api
        .operator_queue(&incharge(), Some("Ravi"), plan_date(), t0())
        .unwrap();
    assert_eq!(by_manager.len(), 1);
}

#[test]
fn test_materials_accumulate_into_total_cost() {
    let env = setup_env();
    seed_customer(&env.repos, "MT-1", Some(20.0));
    let job = env
        .job_api
        .create_job(&owner(), create_request("MT-1", "M1", None), t0())
        .unwrap();

    let with_chemical = env
        .job_api
        .add_chemical(&incharge(), &job.job_id, material("Soda Ash", 12.5), at_minutes(1))
        .unwrap();
    assert_eq!(with_chemical.chemical_cost, 12.5);
    assert_eq!(with_chemical.total_cost, 512.5);

    let with_dye = env
        .job_api
        .add_dye(&incharge(), &job.job_id, material("Reactive Blue", 3.25), at_minutes(2))
        .unwrap();
    assert_eq!(with_dye.dye_cost, 3.25);
    assert_eq!(with_dye.total_cost, 515.75);
    assert!(with_dye
        .history
        .iter()
        .any(|h| h.action == history_actions::DYE_ADDED));

    let negative = env
        .job_api
        .add_dye(&incharge(), &job.job_id, material("Bad", -1.0), at_minutes(3));
    assert!(matches!(negative, Err(ApiError::ValidationError(_))));

    let by_operator = env
        .job_api
        .add_chemical(&operator("Ravi"), &job.job_id, material("Salt", 1.0), at_minutes(4));
    assert!(matches!(by_operator, Err(ApiError::Forbidden(_))));
}

#[test]
fn test_update_recomputes_base_cost_and_reassigns() {
    let env = setup_env();
    seed_customer(&env.repos, "UP-1", Some(20.0));
    let job = env
        .job_api
        .create_job(&owner(), create_request("UP-1", "M1", None), t0())
        .unwrap();

    let updated = env
        .job_api
        .update_job(
            &owner(),
            &job.job_id,
            UpdateJobRequest {
                qty: Some(120.0),
                rate: None,
                operators: Some(vec!["Kumar".to_string()]),
            },
            at_minutes(5),
        )
        .unwrap();
    assert_eq!(updated.base_cost, 600.0);
    assert_eq!(updated.total_cost, 600.0);
    assert_eq!(
        updated.history.last().map(|h| h.action.as_str()),
        Some(history_actions::PROCESS_UPDATED)
    );

    let kumar = env
        .queue_api
        .operator_queue(&operator("Kumar"), None, plan_date(), t0())
        .unwrap();
    assert_eq!(kumar.len(), 1);
    let ravi = env
        .queue_api
        .operator_queue(&operator("Ravi"), None, plan_date(), t0())
        .unwrap();
    assert!(ravi.is_empty());

    let listed = env
        .job_api
        .list_jobs(&JobQuery {
            machine_no: Some("M1".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(listed.len(), 1);
}
