//! Demonstrates attaching attributes to a domain object.
//!
//! A `Job` owns a `ValueStore`. Independent plugins attach their own state to
//! the job under keys only they know about, and a progress plugin reacts to
//! changes another plugin makes.
//!
//! Run with: cargo run --example holder

use sovran_attrmap::{
    EmissionWatcher, Key, KeyRegistry, Observable, StoreError, SubscriptionSet, ValueStore,
    ValueUpdate,
};
use std::sync::Arc;

fn main() -> Result<(), StoreError> {
    let registry = KeyRegistry::new();
    let retries = RetryPlugin::new(&registry);
    let progress = ProgressPlugin::new(&registry);

    let job = Job::new("nightly-export");
    progress.attach(&job)?;

    // Record every change for the summary at the end
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let _audit = job.attributes.observe(&ValueStore::CHANGED, move |u: &ValueUpdate| {
        if let Ok(mut log) = sink.lock() {
            log.push(u.key().to_string());
        }
    })?;

    for step in 1..=4u32 {
        if step == 2 {
            let attempt = retries.record_failure(&job)?;
            println!("step {} failed, attempt {}", step, attempt);
        }
        progress.advance(&job, step * 25)?;
    }

    // Did anything touch the retry counter while we were finishing up?
    let watcher = EmissionWatcher::start(&job.attributes, &ValueStore::CHANGED, {
        let key = retries.failures.clone();
        move |u: &ValueUpdate| u.is_for(&key)
    })?;
    progress.advance(&job, 100)?;
    println!("retries touched at the end: {}", watcher.finish()?);

    println!(
        "{} finished after {} failure(s); {} change(s) recorded",
        job.name,
        job.attributes.get_or(&retries.failures, 0)?,
        log.lock().map(|l| l.len()).unwrap_or(0)
    );
    progress.detach()?;
    Ok(())
}

struct Job {
    name: String,
    attributes: ValueStore,
}

impl Job {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: ValueStore::new(),
        }
    }
}

struct RetryPlugin {
    failures: Key<u32>,
}

impl RetryPlugin {
    fn new(registry: &KeyRegistry) -> Self {
        Self {
            failures: registry.register(),
        }
    }

    fn record_failure(&self, job: &Job) -> Result<u32, StoreError> {
        let next = job
            .attributes
            .update_and_get(&self.failures, |n| Some(n.unwrap_or(0) + 1))?;
        Ok(next.unwrap_or_default())
    }
}

struct ProgressPlugin {
    percent: Key<u32>,
    subs: SubscriptionSet,
}

impl ProgressPlugin {
    fn new(registry: &KeyRegistry) -> Self {
        Self {
            percent: registry.register_checked("percentage", |p: &u32| *p <= 100),
            subs: SubscriptionSet::new(),
        }
    }

    fn attach(&self, job: &Job) -> Result<(), StoreError> {
        let name = job.name.clone();
        self.subs
            .observe_key(&job.attributes, &self.percent, move |p: Option<&u32>| {
                if let Some(p) = p {
                    println!("{}: {}%", name, p);
                }
            })?;
        Ok(())
    }

    fn advance(&self, job: &Job, percent: u32) -> Result<(), StoreError> {
        job.attributes.set(&self.percent, percent)
    }

    fn detach(&self) -> Result<(), StoreError> {
        self.subs.release_all()
    }
}
