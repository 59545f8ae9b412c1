// ==========================================
// 回修链集成测试
// ==========================================
// 测试目标: 代次递增、回单号唯一、客户回单号跟随、成本结转
// ==========================================


use std::collections::HashSet;

use dyehouse_workflow::api::{ApiError, ClosingRequest, ReprocessRequest, StartRequest};
use dyehouse_workflow::domain::{history_actions, JobStatus};
use dyehouse_workflow::engine::TransitionOutcome;
use test_helpers::*;

fn start(env: &TestEnv, receiver_no: &str, opening: f64, minute: i64) -> TransitionOutcome {
    env.water_api
        .start(
            &owner(),
            StartRequest {
                receiver_number: receiver_no.to_string(),
                opening_reading: opening,
            },
            at_minutes(minute),
        )
        .unwrap()
}

fn same_day() -> ReprocessRequest {
    ReprocessRequest {
        date: Some(plan_date()),
        ..Default::default()
    }
}

#[test]
fn test_pending_job_cannot_be_reprocessed() {
    let env = setup_env();
    seed_customer(&env.repos, "1024", Some(25.0));
    env.job_api
        .create_job(&owner(), create_request("1024", "M1", None), t0())
        .unwrap();

    let result = env
        .job_api
        .reprocess_by_receiver(&owner(), "1024", same_day(), at_minutes(1));
    assert!(matches!(result, Err(ApiError::Conflict(_))));

    let by_operator = env
        .job_api
        .reprocess_by_receiver(&operator("Ravi"), "1024", same_day(), at_minutes(1));
    assert!(matches!(by_operator, Err(ApiError::Forbidden(_))));
}

#[test]
fn test_reprocess_chain_generates_increasing_cycles() {
    let env = setup_env();
    seed_customer(&env.repos, "1024", Some(25.0));
    let first = env
        .job_api
        .create_job(&owner(), create_request("1024", "M1", None), t0())
        .unwrap();

    // 第一代完工: 500 + 0.8
    let water_id = start(&env, "1024", 1000.0, 0).water.water_id;
    env.water_api
        .calculate_cost(
            &owner(),
            &water_id,
            ClosingRequest {
                closing_reading: Some(1050.0),
            },
            at_minutes(50),
        )
        .unwrap();

    let second = env
        .job_api
        .reprocess_by_receiver(&owner(), "1024", same_day(), at_minutes(60))
        .unwrap();
    assert_eq!(second.job.receiver_no, "1024-2");
    assert_eq!(second.job.cycle, 2);
    assert_eq!(second.job.carried_cost, Some(500.8));
    assert_eq!(second.job.total_cost, 500.8);
    assert_eq!(second.job.status, JobStatus::Pending);
    assert_eq!(second.previous.status, JobStatus::Reprocess);
    assert!(env.repos.customer_repo.find_by_receiver("1024-2").unwrap().is_some());
    assert!(env.repos.customer_repo.find_by_receiver("1024").unwrap().is_none());

    // 旧回单号不能再开工
    let stale = env.water_api.start(
        &owner(),
        StartRequest {
            receiver_number: "1024".to_string(),
            opening_reading: 0.0,
        },
        at_minutes(61),
    );
    assert!(matches!(stale, Err(ApiError::Conflict(_))));

    // 第二代运行中再回修: 先停机
    let running = start(&env, "1024-2", 2000.0, 70);
    let third = env
        .job_api
        .reprocess_by_receiver(&owner(), "RP-1024", same_day(), at_minutes(90))
        .unwrap();
    assert_eq!(third.job.receiver_no, "1024-3");
    assert_eq!(third.job.cycle, 3);
    assert_eq!(third.previous.job_id, second.job.job_id);
    let stopped = env.water_api.get_water(&running.water.water_id).unwrap();
    assert_eq!(stopped.running_time_minutes, 20.0);
    assert!(env.repos.customer_repo.find_by_receiver("1024-3").unwrap().is_some());

    let chain = env.job_api.list_cycles("1024").unwrap();
    let cycles: Vec<i32> = chain.iter().map(|j| j.cycle).collect();
    assert_eq!(cycles, vec![1, 2, 3]);
    let receivers: HashSet<&str> = chain.iter().map(|j| j.receiver_no.as_str()).collect();
    assert_eq!(receivers.len(), 3);
    assert_eq!(chain[0].job_id, first.job_id);
    assert!(chain[0]
        .history
        .iter()
        .any(|h| h.action == history_actions::REPROCESS_STARTED));

    // 链上最新代次只有一条
    let latest = env.job_api.latest_per_receiver().unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].receiver_no, "1024-3");
}

#[test]
fn test_reprocessed_cycle_cost_starts_from_carried_cost() {
    let env = setup_env();
    seed_customer(&env.repos, "3300", Some(25.0));
    env.job_api
        .create_job(&owner(), create_request("3300", "M1", None), t0())
        .unwrap();
    let water_id = start(&env, "3300", 1000.0, 0).water.water_id;
    env.water_api
        .calculate_cost(
            &owner(),
            &water_id,
            ClosingRequest {
                closing_reading: Some(1050.0),
            },
            at_minutes(30),
        )
        .unwrap();

    let next = env
        .job_api
        .reprocess_by_id(
            &owner(),
            &env.repos.job_repo.find_by_receiver("3300").unwrap()[0].job_id,
            same_day(),
            at_minutes(40),
        )
        .unwrap();
    let water_id = start(&env, &next.job.receiver_no, 1050.0, 50).water.water_id;
    let costed = env
        .water_api
        .calculate_cost(
            &owner(),
            &water_id,
            ClosingRequest {
                closing_reading: Some(1100.0),
            },
            at_minutes(80),
        )
        .unwrap();

    // 500.8 结转 + 本代用水 0.8, 不重复计基础加工费
    assert_eq!(costed.total_cost, 501.6);
    assert_eq!(costed.job.base_cost, 500.0);
}

#[test]
fn test_reprocess_onto_other_machine_and_slot() {
    let env = setup_env();
    seed_customer(&env.repos, "4400", Some(25.0));
    seed_customer(&env.repos, "4401", Some(25.0));
    env.job_api
        .create_job(&owner(), create_request("4401", "M2", None), t0())
        .unwrap();
    env.job_api
        .create_job(&owner(), create_request("4400", "M1", None), t0())
        .unwrap();
    let water_id = start(&env, "4400", 0.0, 1).water.water_id;
    env.water_api
        .stop(&owner(), &water_id, ClosingRequest::default(), at_minutes(11))
        .unwrap();

    let next = env
        .job_api
        .reprocess_by_receiver(
            &incharge(),
            "4400",
            ReprocessRequest {
                date: Some(plan_date()),
                machine_no: Some("M2".to_string()),
                order_no: Some(1),
            },
            at_minutes(20),
        )
        .unwrap();
    assert_eq!(next.job.machine_no, "M2");
    assert_eq!(next.job.order_no, Some(1));

    let m2 = env.queue_api.machine_queue("M2", plan_date(), t0()).unwrap();
    let order: Vec<&str> = m2.iter().map(|item| item.job.receiver_no.as_str()).collect();
    assert_eq!(order, vec!["4400-2", "4401"]);
}

#[test]
fn test_new_job_on_reprocessed_receiver_stays_on_chain() {
    let env = setup_env();
    seed_customer(&env.repos, "1024", Some(25.0));
    env.job_api
        .create_job(&owner(), create_request("1024", "M1", None), t0())
        .unwrap();
    let water_id = start(&env, "1024", 1000.0, 0).water.water_id;
    env.water_api
        .calculate_cost(
            &owner(),
            &water_id,
            ClosingRequest {
                closing_reading: Some(1050.0),
            },
            at_minutes(30),
        )
        .unwrap();
    let second = env
        .job_api
        .reprocess_by_receiver(&owner(), "1024", same_day(), at_minutes(40))
        .unwrap();
    assert_eq!(second.job.receiver_no, "1024-2");

    let water_id = start(&env, "1024-2", 1050.0, 50).water.water_id;
    env.water_api
        .calculate_cost(
            &owner(),
            &water_id,
            ClosingRequest {
                closing_reading: Some(1100.0),
            },
            at_minutes(80),
        )
        .unwrap();

    // 对已完工的回修号重新建单: 归入原链, 不另起 1024-2 链
    let fresh = env
        .job_api
        .create_job(&owner(), create_request("1024-2", "M1", None), at_minutes(90))
        .unwrap();
    assert_eq!(fresh.base_receiver, "1024");
    assert_eq!(fresh.cycle, 3);
    assert_eq!(fresh.receiver_no, "1024-2");

    let water_id = start(&env, "1024-2", 1100.0, 100).water.water_id;
    env.water_api
        .stop(&owner(), &water_id, ClosingRequest::default(), at_minutes(110))
        .unwrap();
    let next = env
        .job_api
        .reprocess_by_receiver(&owner(), "1024-2", same_day(), at_minutes(120))
        .unwrap();
    assert_eq!(next.previous.job_id, fresh.job_id);
    assert_eq!(next.job.base_receiver, "1024");
    assert_eq!(next.job.cycle, 4);
    assert_eq!(next.job.receiver_no, "1024-4");

    let cycles: Vec<i32> = env
        .job_api
        .list_cycles("1024")
        .unwrap()
        .iter()
        .map(|j| j.cycle)
        .collect();
    assert_eq!(cycles, vec![1, 2, 3, 4]);
}
