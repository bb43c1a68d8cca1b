//! Poller behaviour across whole poll cycles.

mod common;

use common::{drain, task, FixedBoard, SlowBoard};
use genroute::task::{is_sorted, PromptFormatter};
use genroute::{
    EntryStatus, MemoryJobBoard, NotificationKind, PollOutcome, Task, TaskId, TaskManager,
    TaskStatus, VisibleEntry,
};
use std::sync::Arc;
use std::time::Duration;

fn example_last(entries: &[VisibleEntry]) -> bool {
    entries.last().is_some_and(|entry| entry.is_example())
        && entries.iter().filter(|entry| entry.is_example()).count() == 1
}

#[tokio::test]
async fn test_ordering_holds_after_every_round() {
    let board = Arc::new(MemoryJobBoard::new());
    let (manager, _notes) = TaskManager::builder(board.clone())
        .example("https://cdn.example.com/example.mp4", "example prompt")
        .build();

    for id in 1..=6 {
        board.upsert(task(id, TaskStatus::Pending, id * 10));
    }
    manager.add_tasks((1..=6).map(TaskId));

    let script: &[(i64, TaskStatus)] = &[
        (3, TaskStatus::Succeeded),
        (1, TaskStatus::Processing),
        (5, TaskStatus::Succeeded),
        (2, TaskStatus::Failed),
        (6, TaskStatus::Processing),
        (4, TaskStatus::Succeeded),
        (1, TaskStatus::Succeeded),
        (6, TaskStatus::Finished),
    ];

    manager.poll_once().await;
    let visible = manager.visible();
    assert!(is_sorted(&visible) && example_last(&visible));

    for (id, status) in script {
        board.set_status(TaskId(*id), *status);
        manager.poll_once().await;
        let visible = manager.visible();
        assert!(is_sorted(&visible), "unsorted after {} -> {:?}", id, status);
        assert!(example_last(&visible));
    }

    let ids: Vec<i64> = manager.visible().iter().map(|entry| entry.id.0).collect();
    assert_eq!(ids, vec![5, 4, 3, 1, TaskId::EXAMPLE.0]);
    assert!(manager.in_flight().is_empty());
}

#[tokio::test]
async fn test_terminal_failure_notifies_once() {
    let board = Arc::new(FixedBoard::new(vec![
        task(5, TaskStatus::Failed, 50),
        task(6, TaskStatus::Processing, 60),
    ]));
    let (manager, mut notes) = TaskManager::builder(board.clone()).build();
    manager.add_tasks([TaskId(5), TaskId(6)]);

    for _ in 0..4 {
        manager.poll_once().await;
        // a stale caller re-adding the id must not produce a second notice
        manager.add_task(TaskId(5));
    }

    let failures: Vec<_> = drain(&mut notes)
        .into_iter()
        .filter(|note| note.task_id == Some(TaskId(5)))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].kind, NotificationKind::Failed(_)));
    assert_eq!(board.queries(), 4);
}

#[tokio::test]
async fn test_failed_task_leaves_visible_list() {
    let board = Arc::new(MemoryJobBoard::new());
    let (manager, mut notes) = TaskManager::builder(board.clone()).build();

    let mut running = task(7, TaskStatus::Processing, 70);
    board.upsert(running.clone());
    manager.add_task(TaskId(7));

    for _ in 0..3 {
        manager.poll_once().await;
        assert!(manager.visible().iter().any(|entry| entry.id == TaskId(7)));
    }

    running.status = TaskStatus::Failed;
    running.failure = Some("No face found in the reference image".to_string());
    board.upsert(running);
    manager.poll_once().await;

    assert!(manager.visible().iter().all(|entry| !entry.matches(TaskId(7))));
    let notes = drain(&mut notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].message_key(), "toast:error.noFace");
}

#[tokio::test]
async fn test_success_is_rekeyed_to_generation_id() {
    let board = Arc::new(FixedBoard::new(vec![
        task(1, TaskStatus::Processing, 10),
        task(2, TaskStatus::Processing, 20),
    ]));
    let (manager, mut notes) = TaskManager::builder(board.clone())
        .example("https://cdn.example.com/example.mp4", "example prompt")
        .build();
    manager.add_tasks([TaskId(1), TaskId(2)]);
    manager.poll_once().await;

    let mut done = task(2, TaskStatus::Succeeded, 20);
    done.generation_id = Some(TaskId(900));
    done.output = Some("https://cdn.example.com/900.mp4".to_string());
    board.set(vec![task(1, TaskStatus::Processing, 10), done]);

    assert_eq!(
        manager.poll_once().await,
        PollOutcome::Polled { remaining: 1 }
    );

    let visible = manager.visible();
    let ids: Vec<TaskId> = visible.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![TaskId(1), TaskId(900), TaskId::EXAMPLE]);
    assert_eq!(visible[0].status, EntryStatus::Generating);
    assert_eq!(visible[1].status, EntryStatus::Done);
    assert_eq!(visible[1].task_id, Some(TaskId(2)));
    assert_eq!(
        visible[1].output.as_deref(),
        Some("https://cdn.example.com/900.mp4")
    );

    let notes = drain(&mut notes);
    assert_eq!(notes.len(), 1);
    assert!(notes[0].is_success());
    assert_eq!(notes[0].task_id, Some(TaskId(2)));
}

#[tokio::test]
async fn test_cold_start_recovery() {
    let board = Arc::new(MemoryJobBoard::new());
    board.upsert(task(1, TaskStatus::Succeeded, 10));
    board.upsert(task(2, TaskStatus::Succeeded, 20));
    board.upsert(task(3, TaskStatus::Processing, 5));

    let (manager, mut notes) = TaskManager::builder(board.clone()).build();
    let recovered = manager.recover(&["video", "video"], None).await.unwrap();
    assert_eq!(recovered, 3);

    let visible = manager.visible();
    let ids: Vec<i64> = visible.iter().map(|entry| entry.id.0).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert!(visible[0].is_generating());
    assert_eq!(manager.in_flight(), vec![TaskId(3)]);
    assert!(drain(&mut notes).is_empty());
    manager.stop();
}

#[tokio::test]
async fn test_recovery_formats_prompts() {
    let board = Arc::new(MemoryJobBoard::new());
    board.upsert(task(1, TaskStatus::Succeeded, 10));

    let (manager, _notes) = TaskManager::builder(board).build();
    let formatter: &PromptFormatter =
        &|task: &Task| format!("#{} {}", task.id, task.prompt.as_deref().unwrap_or_default());
    manager.recover(&["video"], Some(formatter)).await.unwrap();

    assert_eq!(manager.visible()[0].prompt, "#1 prompt 1");
}

#[tokio::test]
async fn test_query_failure_stops_polling() {
    let board = Arc::new(FixedBoard::new(vec![task(1, TaskStatus::Processing, 10)]));
    let (manager, mut notes) = TaskManager::builder(board.clone()).build();
    manager.add_task(TaskId(1));
    manager.poll_once().await;
    assert_eq!(manager.visible().len(), 1);

    board.fail_queries(true);
    assert_eq!(manager.poll_once().await, PollOutcome::QueryFailed);

    assert!(!manager.is_polling());
    assert!(manager.visible().is_empty());
    assert_eq!(manager.in_flight(), vec![TaskId(1)]);
    let notes = drain(&mut notes);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].task_id, None);
    assert_eq!(notes[0].message_key(), "toast:error.videoGenerationFailed");
}

#[tokio::test(start_paused = true)]
async fn test_timer_drives_polling_until_idle() {
    let board = Arc::new(MemoryJobBoard::new());
    board.upsert(task(1, TaskStatus::Processing, 10));

    let (manager, mut notes) = TaskManager::builder(board.clone())
        .interval(Duration::from_secs(5))
        .build();
    assert!(manager.add_task(TaskId(1)));
    assert!(manager.is_polling());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(manager.visible()[0].is_generating());

    board.set_status(TaskId(1), TaskStatus::Succeeded);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(manager.in_flight().is_empty());
    assert_eq!(manager.visible()[0].status, EntryStatus::Done);
    assert_eq!(drain(&mut notes).len(), 1);

    // the next tick finds nothing in flight and stops the timer
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!manager.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_result_landing_after_stop_is_discarded() {
    let mut done = task(4, TaskStatus::Succeeded, 40);
    done.output = Some("https://cdn.example.com/4.mp4".to_string());
    let board = Arc::new(SlowBoard::new(vec![done], Duration::from_millis(200)));
    let (manager, mut notes) = TaskManager::builder(board.clone())
        .example("https://cdn.example.com/example.mp4", "example prompt")
        .build();
    manager.add_task(TaskId(4));
    let before = manager.visible();

    let (outcome, ()) = tokio::join!(manager.poll_once(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop();
    });

    assert_eq!(outcome, PollOutcome::Discarded);
    assert_eq!(board.queries(), 1);
    assert_eq!(manager.visible(), before);
    assert!(example_last(&manager.visible()));
    assert!(drain(&mut notes).is_empty());
    assert!(!manager.is_polling());
}
