use geowatch::{GeoQuery, GeoWatch, Point, QueryCriteria};
use std::sync::{Arc, Mutex};

/// Shared event log; callbacks append formatted entries so tests can
/// assert ordering across event types.
#[derive(Clone, Default)]
struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        Self::default()
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }
}

/// Wire a query's four events into a log.
fn observe(query: &GeoQuery, log: &EventLog) {
    let sink = log.clone();
    query.on_key_entered(move |key, _, distance_km| {
        sink.push(format!("entered {key} {distance_km:.1}"));
    });
    let sink = log.clone();
    query.on_key_moved(move |key, _, distance_km| {
        sink.push(format!("moved {key} {distance_km:.1}"));
    });
    let sink = log.clone();
    query.on_key_exited(move |key, location, distance_km| match (location, distance_km) {
        (Some(_), Some(d)) => sink.push(format!("exited {key} {d:.1}")),
        _ => sink.push(format!("exited {key} null")),
    });
    let sink = log.clone();
    query.on_ready(move || sink.push("ready".to_string()));
}

fn seed_five(geo: &GeoWatch) {
    geo.set("loc1", Point::new(2.0, 3.0)).unwrap();
    geo.set("loc2", Point::new(50.0, -7.0)).unwrap();
    geo.set("loc3", Point::new(16.0, -150.0)).unwrap();
    geo.set("loc4", Point::new(5.0, 5.0)).unwrap();
    geo.set("loc5", Point::new(67.0, 55.0)).unwrap();
}

fn default_query(geo: &GeoWatch) -> GeoQuery {
    geo.query(QueryCriteria::new(Point::new(1.0, 2.0), 1000.0))
        .unwrap()
}

#[test]
fn scenario_initial_membership_then_ready() {
    let geo = GeoWatch::memory();
    seed_five(&geo);

    let query = default_query(&geo);
    let log = EventLog::new();
    observe(&query, &log);

    let events = log.take();
    // The replay order over the membership map is unspecified; sort the
    // entered prefix of the log.
    let (mut entered, rest) = (
        events[..events.len() - 1].to_vec(),
        events[events.len() - 1].clone(),
    );
    entered.sort();
    assert_eq!(
        entered,
        vec!["entered loc1 157.2".to_string(), "entered loc4 555.7".to_string()]
    );
    assert_eq!(rest, "ready");
}

#[test]
fn scenario_update_criteria_exits_members_then_ready() {
    let geo = GeoWatch::memory();
    seed_five(&geo);

    let query = default_query(&geo);
    let log = EventLog::new();
    observe(&query, &log);
    log.take();

    query
        .update_criteria(QueryCriteria::from_center(Point::new(90.0, 90.0)))
        .unwrap();

    let events = log.take();
    let (mut exited, rest) = (
        events[..events.len() - 1].to_vec(),
        events[events.len() - 1].clone(),
    );
    exited.sort();
    assert!(exited.iter().all(|e| e.starts_with("exited ")));
    assert_eq!(exited.len(), 2);
    assert!(exited[0].starts_with("exited loc1"));
    assert!(exited[1].starts_with("exited loc4"));
    assert_eq!(rest, "ready");
    assert!(!events.iter().any(|e| e.starts_with("moved")));
}

#[test]
fn scenario_write_then_move_fires_entered_then_moved() {
    let geo = GeoWatch::memory();
    let query = default_query(&geo);
    let log = EventLog::new();
    observe(&query, &log);
    log.take(); // drop the initial ready

    geo.set("loc1", Point::new(0.0, 0.0)).unwrap();
    geo.set("loc1", Point::new(2.0, 3.0)).unwrap();

    let events = log.take();
    assert_eq!(events[0], "entered loc1 248.6");
    assert_eq!(events[1], "moved loc1 157.2");
    assert_eq!(events.len(), 2);
}

#[test]
fn scenario_remove_fires_exited_with_null_payload() {
    let geo = GeoWatch::memory();
    let query = default_query(&geo);
    let log = EventLog::new();
    observe(&query, &log);
    log.take();

    geo.set("loc1", Point::new(2.0, 3.0)).unwrap();
    geo.remove("loc1").unwrap();

    assert_eq!(
        log.take(),
        vec!["entered loc1 157.2".to_string(), "exited loc1 null".to_string()]
    );
}

#[test]
fn scenario_cancelled_query_goes_silent_while_twin_lives() {
    let geo = GeoWatch::memory();
    let q1 = default_query(&geo);
    let q2 = default_query(&geo);

    let log1 = EventLog::new();
    let log2 = EventLog::new();
    observe(&q1, &log1);
    observe(&q2, &log2);
    log1.take();
    log2.take();

    q1.cancel();
    geo.set("loc1", Point::new(2.0, 3.0)).unwrap();

    assert!(log1.take().is_empty());
    assert_eq!(log2.take(), vec!["entered loc1 157.2".to_string()]);
}

#[test]
fn scenario_cancel_from_replay_stops_after_one_event() {
    let geo = GeoWatch::memory();
    // Five keys inside the circle.
    for (key, lat) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0), ("e", 5.0)] {
        geo.set(key, Point::new(lat, 2.0)).unwrap();
    }

    let query = Arc::new(default_query(&geo));
    let deliveries = Arc::new(Mutex::new(0usize));

    let counter = deliveries.clone();
    let cancel_target = query.clone();
    query.on_key_entered(move |_, _, _| {
        *counter.lock().unwrap() += 1;
        cancel_target.cancel();
    });

    assert_eq!(*deliveries.lock().unwrap(), 1);
    assert!(query.is_cancelled());
}

#[test]
fn update_criteria_with_no_new_ranges_still_fires_ready() {
    let geo = GeoWatch::memory();
    let query = default_query(&geo);
    let log = EventLog::new();
    observe(&query, &log);
    log.take();

    // Identical criteria: the plan cannot change, so no value events
    // will fire; the barrier must complete on its own.
    query
        .update_criteria(QueryCriteria::new(Point::new(1.0, 2.0), 1000.0))
        .unwrap();
    assert_eq!(log.take(), vec!["ready".to_string()]);
}

#[test]
fn update_criteria_orders_membership_events_before_new_backlog() {
    let geo = GeoWatch::memory();
    geo.set("west", Point::new(1.0, 2.0)).unwrap();
    geo.set("east", Point::new(1.0, 120.0)).unwrap();

    let query = geo
        .query(QueryCriteria::new(Point::new(1.0, 2.0), 500.0))
        .unwrap();
    let log = EventLog::new();
    observe(&query, &log);
    assert_eq!(
        log.take(),
        vec!["entered west 0.0".to_string(), "ready".to_string()]
    );

    query
        .update_criteria(QueryCriteria::from_center(Point::new(1.0, 120.0)))
        .unwrap();

    let events = log.take();
    // The synchronous exit precedes anything from the new plan's
    // subscriptions, and ready comes last.
    assert!(events[0].starts_with("exited west"));
    assert!(events.contains(&"entered east 0.0".to_string()));
    assert_eq!(events.last().unwrap(), "ready");
}

#[test]
fn moved_key_between_covered_ranges_does_not_exit() {
    let geo = GeoWatch::memory();
    let query = default_query(&geo);
    let log = EventLog::new();
    observe(&query, &log);
    log.take();

    // Hop the key around inside the circle; every hop lands in a
    // (possibly) different planned range, yet the stream must stay
    // entered → moved* with no spurious exits.
    geo.set("loc1", Point::new(2.0, 3.0)).unwrap();
    geo.set("loc1", Point::new(-2.0, 3.0)).unwrap();
    geo.set("loc1", Point::new(1.5, -2.0)).unwrap();

    let events = log.take();
    assert!(events[0].starts_with("entered loc1"));
    assert!(events[1..].iter().all(|e| e.starts_with("moved loc1")));
    assert_eq!(events.len(), 3);
}

#[test]
fn late_ready_listener_fires_immediately_and_once() {
    let geo = GeoWatch::memory();
    let query = default_query(&geo);

    let fired = Arc::new(Mutex::new(0usize));
    let counter = fired.clone();
    query.on_ready(move || *counter.lock().unwrap() += 1);
    assert_eq!(*fired.lock().unwrap(), 1);

    // Nothing else fires it again without a criteria change.
    geo.set("loc1", Point::new(2.0, 3.0)).unwrap();
    assert_eq!(*fired.lock().unwrap(), 1);
}

#[test]
fn get_reflects_set_and_remove_through_the_facade() {
    let geo = GeoWatch::memory();
    assert_eq!(geo.get("loc1").unwrap(), None);

    geo.set("loc1", Point::new(2.0, 3.0)).unwrap();
    assert_eq!(geo.get("loc1").unwrap(), Some(Point::new(2.0, 3.0)));

    geo.remove("loc1").unwrap();
    assert_eq!(geo.get("loc1").unwrap(), None);
}
