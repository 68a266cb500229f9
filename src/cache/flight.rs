//! Keyed single-flight admission barrier.
//!
//! At most one task per key performs a given unit of work; every other
//! requester for that key joins the flight and observes the same outcome. A
//! flight's key is removed before its outcome is published, so the next
//! acquisition after completion always starts a fresh epoch.

// crates.io
use serde_json::Value;
use tokio::sync::watch;
// self
use crate::{_prelude::*, error::ServiceError};

/// Shared outcome observed by the leader and every follower of one flight.
pub(crate) type FlightOutcome = Result<Arc<Value>, ServiceError>;

type OutcomeReceiver = watch::Receiver<Option<FlightOutcome>>;

/// Table of in-flight fetches keyed by principal name.
#[derive(Default)]
pub(crate) struct FlightTable {
	flights: Mutex<HashMap<String, OutcomeReceiver>>,
}
impl FlightTable {
	/// Number of flights currently in progress.
	#[cfg(test)]
	pub(crate) fn in_flight(&self) -> usize {
		self.flights.lock().len()
	}
}

/// Atomically installs a flight for `key`, or joins the one in progress.
pub(crate) fn acquire(table: &Arc<FlightTable>, key: &str) -> Admission {
	let mut flights = table.flights.lock();

	if let Some(rx) = flights.get(key) {
		return Admission::Follower(rx.clone());
	}

	let (tx, rx) = watch::channel(None);

	flights.insert(key.to_owned(), rx);

	Admission::Leader(FlightPermit { table: table.clone(), key: key.to_owned(), tx: Some(tx) })
}
impl Debug for FlightTable {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlightTable").field("in_flight", &self.flights.lock().len()).finish()
	}
}

/// Result of one [`acquire`] call.
pub(crate) enum Admission {
	/// Caller installed the flight and must perform the work.
	Leader(FlightPermit),
	/// Another caller is flying; await the shared outcome.
	Follower(OutcomeReceiver),
}

/// Obligation held by the flight leader.
///
/// Dropping the permit without fulfilling it publishes
/// [`ServiceError::Interrupted`] so followers are never stranded when the
/// leader's task is cancelled or panics.
pub(crate) struct FlightPermit {
	table: Arc<FlightTable>,
	key: String,
	tx: Option<watch::Sender<Option<FlightOutcome>>>,
}
impl FlightPermit {
	/// Publishes the outcome to every follower and ends this flight's epoch.
	pub(crate) fn fulfill(mut self, outcome: FlightOutcome) {
		self.complete(outcome);
	}

	fn complete(&mut self, outcome: FlightOutcome) {
		if let Some(tx) = self.tx.take() {
			// The key must disappear before the outcome lands so a requester
			// arriving after completion starts a new epoch instead of joining
			// a finished flight.
			self.table.flights.lock().remove(&self.key);

			let _ = tx.send(Some(outcome));
		}
	}
}
impl Drop for FlightPermit {
	fn drop(&mut self) {
		self.complete(Err(ServiceError::Interrupted));
	}
}

/// Parks on an existing flight until its shared outcome is published.
pub(crate) async fn await_outcome(mut rx: OutcomeReceiver) -> FlightOutcome {
	match rx.wait_for(Option::is_some).await {
		Ok(outcome) => (*outcome).clone().unwrap_or(Err(ServiceError::Interrupted)),
		Err(_) => Err(ServiceError::Interrupted),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[tokio::test]
	async fn followers_share_the_leader_outcome() {
		let table = Arc::new(FlightTable::default());
		let Admission::Leader(permit) = acquire(&table, "alice") else {
			panic!("First acquisition should lead the flight.");
		};
		let Admission::Follower(rx) = acquire(&table, "alice") else {
			panic!("Second acquisition should follow the flight.");
		};
		let waiter = tokio::spawn(await_outcome(rx));

		assert_eq!(table.in_flight(), 1);

		permit.fulfill(Ok(Arc::new(json!({"grants": []}))));

		let outcome = waiter.await.expect("Waiter task should complete.");

		assert_eq!(
			outcome.expect("Follower should observe the leader's success."),
			Arc::new(json!({"grants": []}))
		);
		assert_eq!(table.in_flight(), 0);
	}

	#[tokio::test]
	async fn distinct_keys_fly_independently() {
		let table = Arc::new(FlightTable::default());

		assert!(matches!(acquire(&table, "alice"), Admission::Leader(_)));
		assert!(matches!(acquire(&table, "bob"), Admission::Leader(_)));
	}

	#[tokio::test]
	async fn dropped_permit_interrupts_followers_and_frees_the_key() {
		let table = Arc::new(FlightTable::default());
		let Admission::Leader(permit) = acquire(&table, "alice") else {
			panic!("First acquisition should lead the flight.");
		};
		let Admission::Follower(rx) = acquire(&table, "alice") else {
			panic!("Second acquisition should follow the flight.");
		};

		drop(permit);

		assert!(matches!(await_outcome(rx).await, Err(ServiceError::Interrupted)));
		assert!(
			matches!(acquire(&table, "alice"), Admission::Leader(_)),
			"A fresh epoch should start after the abandoned flight.",
		);
	}

	#[tokio::test]
	async fn completed_flight_starts_a_new_epoch() {
		let table = Arc::new(FlightTable::default());
		let Admission::Leader(permit) = acquire(&table, "alice") else {
			panic!("First acquisition should lead the flight.");
		};

		permit.fulfill(Err(ServiceError::Closed));

		assert!(matches!(acquire(&table, "alice"), Admission::Leader(_)));
	}
}
