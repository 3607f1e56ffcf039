use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use bulkops_core::{ItemId, ItemKind};

use super::*;

fn orders(n: usize) -> Vec<WorkItem> {
    (1..=n)
        .map(|id| WorkItem::new(i64::try_from(id).unwrap(), ItemKind::Order))
        .collect()
}

/// Tracks how many operations are running at once.
#[derive(Default)]
struct Gauge {
    current: Cell<usize>,
    peak: Cell<usize>,
    started: RefCell<Vec<ItemId>>,
}

impl Gauge {
    fn enter(&self, id: &ItemId) {
        self.started.borrow_mut().push(id.clone());
        self.current.set(self.current.get() + 1);
        self.peak.set(self.peak.get().max(self.current.get()));
    }

    fn leave(&self) {
        self.current.set(self.current.get() - 1);
    }
}

#[tokio::test]
async fn empty_input_completes_immediately() {
    let settings = BulkSettings::new(3, None, 100);
    let token = StopToken::new();
    let mut settled = 0usize;

    let report = dispatch(
        Vec::new(),
        &settings,
        &token,
        |_item| async { Ok(()) },
        |_, _| settled += 1,
    )
    .await;

    assert_eq!(report.attempted, 0);
    assert!(report.not_started.is_empty());
    assert_eq!(settled, 0);
}

#[tokio::test]
async fn every_item_attempted_once_within_concurrency_bound() {
    for (n, k) in [(1, 1), (5, 2), (7, 3), (10, 10), (12, 4)] {
        let gauge = Rc::new(Gauge::default());
        let settings = BulkSettings::new(k, None, 100);
        let token = StopToken::new();
        let mut settled: HashMap<ItemId, usize> = HashMap::new();

        let report = dispatch(
            orders(n),
            &settings,
            &token,
            |item| {
                let gauge = Rc::clone(&gauge);
                async move {
                    gauge.enter(item.id());
                    tokio::time::sleep(Duration::from_millis(3)).await;
                    gauge.leave();
                    Ok(())
                }
            },
            |item, _| *settled.entry(item.id().clone()).or_default() += 1,
        )
        .await;

        assert_eq!(report.attempted, n, "n={n} k={k}");
        assert!(report.not_started.is_empty());
        assert_eq!(gauge.started.borrow().len(), n, "each item started once");
        assert_eq!(settled.len(), n, "each item settled");
        assert!(settled.values().all(|count| *count == 1));
        assert!(
            gauge.peak.get() <= k,
            "peak {} exceeded bound {k}",
            gauge.peak.get()
        );
    }
}

#[tokio::test]
async fn items_start_in_input_order() {
    let gauge = Rc::new(Gauge::default());
    let settings = BulkSettings::new(2, None, 100);
    let token = StopToken::new();

    dispatch(
        orders(5),
        &settings,
        &token,
        |item| {
            let gauge = Rc::clone(&gauge);
            async move {
                gauge.enter(item.id());
                gauge.leave();
                Ok(())
            }
        },
        |_, _| {},
    )
    .await;

    let started: Vec<String> = gauge
        .started
        .borrow()
        .iter()
        .map(|id| id.as_str().to_owned())
        .collect();
    assert_eq!(started, ["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn concurrency_above_ten_is_clamped() {
    let gauge = Rc::new(Gauge::default());
    let settings = BulkSettings::new(64, None, 100);
    let token = StopToken::new();

    let report = dispatch(
        orders(25),
        &settings,
        &token,
        |item| {
            let gauge = Rc::clone(&gauge);
            async move {
                gauge.enter(item.id());
                tokio::time::sleep(Duration::from_millis(2)).await;
                gauge.leave();
                Ok(())
            }
        },
        |_, _| {},
    )
    .await;

    assert_eq!(report.attempted, 25);
    assert!(gauge.peak.get() <= 10);
}

#[tokio::test]
async fn failures_are_reported_without_aborting_siblings() {
    let settings = BulkSettings::new(3, None, 100);
    let token = StopToken::new();
    let mut outcomes: Vec<(String, ItemOutcome)> = Vec::new();

    let report = dispatch(
        orders(3),
        &settings,
        &token,
        |item| async move {
            if item.id().as_str() == "2" {
                Err(ItemFailure::new("remote rejected update"))
            } else {
                Ok(())
            }
        },
        |item, outcome| outcomes.push((item.id().as_str().to_owned(), outcome)),
    )
    .await;

    assert_eq!(report.attempted, 3);
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(outcomes[0].1, ItemOutcome::Succeeded);
    assert_eq!(
        outcomes[1].1,
        ItemOutcome::failed("remote rejected update")
    );
    assert_eq!(outcomes[2].1, ItemOutcome::Succeeded);
}

#[tokio::test]
async fn stop_prevents_new_starts_but_in_flight_items_settle() {
    let settings = BulkSettings::new(2, None, 100);
    let token = StopToken::new();
    let gauge = Rc::new(Gauge::default());
    let mut settled: Vec<String> = Vec::new();

    let report = dispatch(
        orders(6),
        &settings,
        &token,
        |item| {
            let gauge = Rc::clone(&gauge);
            let token = token.clone();
            async move {
                gauge.enter(item.id());
                if item.id().as_str() == "1" {
                    token.request_stop();
                } else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                gauge.leave();
                Ok(())
            }
        },
        |item, _| settled.push(item.id().as_str().to_owned()),
    )
    .await;

    // Items 1 and 2 were both in flight when the stop landed.
    assert_eq!(report.attempted, 2);
    assert_eq!(gauge.started.borrow().len(), 2);
    settled.sort();
    assert_eq!(settled, ["1", "2"]);

    let skipped: Vec<&str> = report
        .not_started
        .iter()
        .map(|item| item.id().as_str())
        .collect();
    assert_eq!(skipped, ["3", "4", "5", "6"]);
    assert!(report.stopped_early());
}

#[tokio::test]
async fn stop_before_start_attempts_nothing() {
    let settings = BulkSettings::new(4, None, 100);
    let token = StopToken::new();
    token.request_stop();

    let report = dispatch(
        orders(3),
        &settings,
        &token,
        |_item| async { Ok(()) },
        |_, _| panic!("nothing should settle"),
    )
    .await;

    assert_eq!(report.attempted, 0);
    assert_eq!(report.not_started.len(), 3);
}

#[tokio::test]
async fn inter_item_delay_spaces_consecutive_starts() {
    let settings = BulkSettings::new(3, Some(100), 100);
    let token = StopToken::new();
    let starts: RefCell<Vec<Instant>> = RefCell::new(Vec::new());

    dispatch(
        orders(3),
        &settings,
        &token,
        |_item| {
            starts.borrow_mut().push(Instant::now());
            async { Ok(()) }
        },
        |_, _| {},
    )
    .await;

    let starts = starts.into_inner();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(
            pair[1].duration_since(pair[0]) >= Duration::from_millis(100),
            "starts were closer than the configured delay"
        );
    }
}

#[tokio::test]
async fn stop_during_delay_wait_returns_promptly() {
    // Maximum delay: without an early wake-up this test would take 100s.
    let settings = BulkSettings::new(3, Some(100_000), 100);
    let token = StopToken::new();
    let stopper = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        stopper.request_stop();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        dispatch(
            orders(3),
            &settings,
            &token,
            |_item| async { Ok(()) },
            |_, _| {},
        ),
    )
    .await
    .expect("dispatch should wake on stop");

    assert_eq!(report.attempted, 1);
    assert_eq!(report.not_started.len(), 2);
}
