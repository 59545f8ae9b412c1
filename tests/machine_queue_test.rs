// ==========================================
// 机台排队集成测试
// ==========================================
// 测试目标: 序号连续、插队后移、离队压实、FIFO 开工、调序
// ==========================================


use dyehouse_workflow::api::{ApiError, ClosingRequest, ReorderRequest, StartRequest};
use dyehouse_workflow::domain::{history_actions, JobRecord, JobStatus, WaterProcess, WaterStatus};
use test_helpers::*;

fn queued_slots(env: &TestEnv, machine_no: &str) -> Vec<i32> {
    let mut slots: Vec<i32> = env
        .queue
        .list(machine_no, &plan_date())
        .unwrap()
        .into_iter()
        .filter_map(|job| job.order_no)
        .collect();
    slots.sort();
    slots
}

fn slot_of(env: &TestEnv, job: &JobRecord) -> Option<i32> {
    env.repos.job_repo.find_by_id(&job.job_id).unwrap().unwrap().order_no
}

fn create(env: &TestEnv, receiver_no: &str, order_no: Option<i32>, minute: i64) -> JobRecord {
    seed_customer(&env.repos, receiver_no, Some(20.0));
    env.job_api
        .create_job(&owner(), create_request(receiver_no, "M1", order_no), at_minutes(minute))
        .unwrap()
}

#[test]
fn test_duplicate_order_no_shifts_existing_job() {
    let env = setup_env();
    let first = create(&env, "R-1", Some(1), 0);
    let second = create(&env, "R-2", Some(1), 1);

    assert_eq!(slot_of(&env, &second), Some(1));
    assert_eq!(slot_of(&env, &first), Some(2));
    assert_eq!(queued_slots(&env, "M1"), vec![1, 2]);
}

#[test]
fn test_queue_stays_dense_across_assign_and_remove() {
    let env = setup_env();
    let a = create(&env, "A-1", None, 0);
    let b = create(&env, "B-1", Some(1), 1);
    let c = create(&env, "C-1", Some(2), 2);
    // 超过 N+1 的序号钳到队尾
    let d = create(&env, "D-1", Some(40), 3);
    let e = create(&env, "E-1", None, 4);
    assert_eq!(queued_slots(&env, "M1"), vec![1, 2, 3, 4, 5]);
    assert_eq!(slot_of(&env, &d), Some(4));
    assert_eq!(slot_of(&env, &e), Some(5));

    // 删除队中作业后压实
    env.job_api.delete_job(&owner(), &c.job_id).unwrap();
    assert_eq!(queued_slots(&env, "M1"), vec![1, 2, 3, 4]);

    // 队首开工再停机后离队
    assert_eq!(slot_of(&env, &b), Some(1));
    let started = env
        .water_api
        .start(
            &owner(),
            StartRequest {
                receiver_number: "B-1".to_string(),
                opening_reading: 0.0,
            },
            at_minutes(10),
        )
        .unwrap();
    assert_eq!(queued_slots(&env, "M1"), vec![1, 2, 3, 4]);
    env.water_api
        .stop(&owner(), &started.water.water_id, ClosingRequest::default(), at_minutes(20))
        .unwrap();
    assert_eq!(queued_slots(&env, "M1"), vec![1, 2, 3]);
    assert_eq!(slot_of(&env, &a), Some(1));
    assert_eq!(slot_of(&env, &b), None);
}

#[test]
fn test_start_enforces_fifo() {
    let env = setup_env();
    create(&env, "F-1", None, 0);
    create(&env, "F-2", None, 1);

    let out_of_order = env.water_api.start(
        &owner(),
        StartRequest {
            receiver_number: "F-2".to_string(),
            opening_reading: 0.0,
        },
        at_minutes(5),
    );
    assert!(matches!(out_of_order, Err(ApiError::Conflict(_))));

    let items = env.queue_api.machine_queue("M1", plan_date(), t0()).unwrap();
    let startable: Vec<&str> = items
        .iter()
        .filter(|item| item.can_start)
        .map(|item| item.job.receiver_no.as_str())
        .collect();
    assert_eq!(startable, vec!["F-1"]);

    // 队首开工后, canStart 落到下一条 Pending
    env.water_api
        .start(
            &owner(),
            StartRequest {
                receiver_number: "F-1".to_string(),
                opening_reading: 0.0,
            },
            at_minutes(6),
        )
        .unwrap();
    let items = env.queue_api.machine_queue("M1", plan_date(), t0()).unwrap();
    let startable: Vec<&str> = items
        .iter()
        .filter(|item| item.can_start)
        .map(|item| item.job.receiver_no.as_str())
        .collect();
    assert_eq!(startable, vec!["F-2"]);
}

#[test]
fn test_machine_queue_empty_is_not_found() {
    let env = setup_env();
    let result = env.queue_api.machine_queue("M9", plan_date(), t0());
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[test]
fn test_reorder_moves_job_and_records_history() {
    let env = setup_env();
    let a = create(&env, "Q-1", None, 0);
    let b = create(&env, "Q-2", None, 1);
    let c = create(&env, "Q-3", None, 2);

    let moved = env
        .queue_api
        .reorder(&incharge(), &c.job_id, ReorderRequest { order_no: 1 }, at_minutes(5))
        .unwrap();
    assert_eq!(moved.order_no, Some(1));
    assert_eq!(slot_of(&env, &a), Some(2));
    assert_eq!(slot_of(&env, &b), Some(3));
    assert!(moved
        .history
        .iter()
        .any(|h| h.action == history_actions::QUEUE_REORDERED));

    let forbidden = env
        .queue_api
        .reorder(&operator("Ravi"), &a.job_id, ReorderRequest { order_no: 1 }, at_minutes(6));
    assert!(matches!(forbidden, Err(ApiError::Forbidden(_))));
}

#[test]
fn test_delete_rules() {
    let env = setup_env();
    let job = create(&env, "X-1", None, 0);

    let by_incharge = env.job_api.delete_job(&incharge(), &job.job_id);
    assert!(matches!(by_incharge, Err(ApiError::Forbidden(_))));

    env.water_api
        .start(
            &owner(),
            StartRequest {
                receiver_number: "X-1".to_string(),
                opening_reading: 0.0,
            },
            at_minutes(1),
        )
        .unwrap();
    let running = env.job_api.delete_job(&owner(), &job.job_id);
    assert!(matches!(running, Err(ApiError::Conflict(_))));

    let missing = env.job_api.delete_job(&owner(), "no-such-job");
    assert!(matches!(missing, Err(ApiError::NotFound(_))));
}

#[test]
fn test_delete_ignores_water_of_earlier_cycles() {
    let env = setup_env();
    create(&env, "D-1", None, 0);
    let water_id = env
        .water_api
        .start(
            &owner(),
            StartRequest {
                receiver_number: "D-1".to_string(),
                opening_reading: 0.0,
            },
            at_minutes(1),
        )
        .unwrap()
        .water
        .water_id;
    env.water_api
        .calculate_cost(
            &owner(),
            &water_id,
            ClosingRequest {
                closing_reading: Some(10.0),
            },
            at_minutes(20),
        )
        .unwrap();

    // 同回单号再次建单: 旧计量属于上一代, 不阻止删除
    let again = env
        .job_api
        .create_job(&owner(), create_request("D-1", "M1", None), at_minutes(30))
        .unwrap();
    env.job_api.delete_job(&owner(), &again.job_id).unwrap();
    assert!(env.repos.job_repo.find_by_id(&again.job_id).unwrap().is_none());

    // 本代已建立计量行时不能删除
    let third = env
        .job_api
        .create_job(&owner(), create_request("D-1", "M1", None), at_minutes(40))
        .unwrap();
    env.repos
        .water_repo
        .save(&WaterProcess::new("W-D1".to_string(), "D-1", at_minutes(41)))
        .unwrap();
    let blocked = env.job_api.delete_job(&owner(), &third.job_id);
    assert!(matches!(blocked, Err(ApiError::Conflict(_))));
}

#[test]
fn test_queue_reads_resynchronize_after_partial_write() {
    let env = setup_env();
    let first = create(&env, "H-1", None, 0);
    create(&env, "H-2", None, 1);

    // 计量已落库为 Running, 作业状态翻转前中断
    let mut water = WaterProcess::new("W-H1".to_string(), "H-1", at_minutes(5));
    water.status = WaterStatus::Running;
    water.opening_reading = Some(0.0);
    water.start_time = Some(at_minutes(5));
    env.repos.water_repo.save(&water).unwrap();

    let ravi = env
        .queue_api
        .operator_queue(&operator("Ravi"), None, plan_date(), at_minutes(6))
        .unwrap();
    let pending: Vec<&str> = ravi.iter().map(|item| item.job.receiver_no.as_str()).collect();
    assert_eq!(pending, vec!["H-2"]);
    assert!(ravi[0].can_start);

    let items = env.queue_api.machine_queue("M1", plan_date(), at_minutes(7)).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].job.job_id, first.job_id);
    assert_eq!(items[0].job.status, JobStatus::Running);
    assert!(!items[0].can_start);
    assert!(items[1].can_start);

    let stored = env.repos.job_repo.find_by_id(&first.job_id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    let resyncs = stored
        .history
        .iter()
        .filter(|h| h.action == history_actions::STATUS_RESYNCED)
        .count();
    assert_eq!(resyncs, 1);
}
