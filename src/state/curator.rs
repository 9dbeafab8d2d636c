//! StateCurator - owns the canonical state and mediates producer/consumer traffic
//!
//! Producers (control surfaces, network inputs) push property changes through a
//! [`StateSink`]. The curator applies a change only when it differs from the
//! current value and then fans it out to every consumer except the producer
//! that caused it.

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, info, info_span, trace, warn, Span};

use super::metadata::{StateMetadata, StateType};
use super::types::PropertyValue;
use crate::error::{StateError, StateResult};

/// Passive observer of property changes
///
/// Called synchronously while the curator's critical section is held: an
/// implementation must not block on I/O for long and must not call back into
/// the same curator.
pub trait StateConsumer: Send + Sync {
    fn update_state(&self, property: &str, value: &PropertyValue);
}

impl<F> StateConsumer for F
where
    F: Fn(&str, &PropertyValue) + Send + Sync,
{
    fn update_state(&self, property: &str, value: &PropertyValue) {
        self(property, value)
    }
}

/// Origin of property changes that can be resynchronized from the state
pub trait StateProducer<T>: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Called exactly once, before the first [`StateProducer::update_state`].
    ///
    /// Register asynchronous listeners here that forward into `sink`. The
    /// sink must not be invoked synchronously from within this call.
    fn initialize(&self, sink: StateSink<T>) -> anyhow::Result<()>;

    /// Full-state push; unmapped properties are skipped
    fn update_state(&self, state: &T) -> anyhow::Result<()>;
}

/// Address of the allocation behind an `Arc`, used as producer/consumer identity
fn identity<P: ?Sized>(ptr: &Arc<P>) -> usize {
    Arc::as_ptr(ptr) as *const () as usize
}

struct CuratorInner<T> {
    state: Mutex<T>,
    metadata: Arc<StateMetadata<T>>,
    producers: Vec<Arc<dyn StateProducer<T>>>,
    consumers: RwLock<Vec<Arc<dyn StateConsumer>>>,
    span: Span,
}

impl<T> CuratorInner<T> {
    /// Change path shared by producer sinks and external writes
    ///
    /// Returns whether the state changed.
    fn apply(&self, origin: Option<usize>, name: &str, value: PropertyValue) -> StateResult<bool> {
        let descriptor = match self.metadata.descriptor(name) {
            Some(descriptor) => descriptor,
            None if origin.is_some() => {
                return Err(StateError::UnknownMappedProperty(name.to_string()))
            }
            None => return Err(StateError::UnknownProperty(name.to_string())),
        };
        if descriptor.kind() != value.kind() {
            return Err(StateError::TypeMismatch {
                name: name.to_string(),
                expected: descriptor.kind(),
                actual: value.kind(),
            });
        }
        let accessor = self
            .metadata
            .accessor(name)
            .ok_or_else(|| StateError::UnknownProperty(name.to_string()))?;

        let mut state = self.state.lock();
        let current = accessor.get(&state);
        if current == value {
            trace!("Unchanged property: {} [{}]", name, current);
            return Ok(false);
        }

        debug!("Setting property: {} [{}->{}]", name, current, value);
        accessor.set(&mut state, value.clone());

        let consumers = self.consumers.read().clone();
        for consumer in consumers
            .iter()
            .filter(|consumer| Some(identity(*consumer)) != origin)
        {
            consumer.update_state(name, &value);
        }
        Ok(true)
    }

    fn push_to_producers(&self, state: &T) {
        for producer in &self.producers {
            if let Err(e) = producer.update_state(state) {
                warn!("Failed to resync producer '{}': {:#}", producer.name(), e);
            }
        }
    }
}

/// Handle through which a producer reports changes to its curator
pub struct StateSink<T> {
    curator: Weak<CuratorInner<T>>,
    origin: usize,
}

impl<T> Clone for StateSink<T> {
    fn clone(&self) -> Self {
        Self {
            curator: self.curator.clone(),
            origin: self.origin,
        }
    }
}

impl<T> StateSink<T> {
    /// Report a new property value
    ///
    /// Returns `Ok(true)` when the state changed and consumers were notified,
    /// `Ok(false)` when the value was already current.
    pub fn update_state(&self, property: &str, value: impl Into<PropertyValue>) -> StateResult<bool> {
        let curator = self.curator.upgrade().ok_or(StateError::Detached)?;
        let _enter = curator.span.enter();
        curator.apply(Some(self.origin), property, value.into())
    }
}

/// Owner of the canonical state instance
pub struct StateCurator<T> {
    inner: Arc<CuratorInner<T>>,
}

impl<T> Clone for StateCurator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StateType> StateCurator<T> {
    /// Create a curator, initialize every producer in order, then resync them
    pub fn new(
        state: T,
        metadata: Arc<StateMetadata<T>>,
        producers: Vec<Arc<dyn StateProducer<T>>>,
    ) -> StateResult<Self> {
        let span = info_span!("state_curator", state = std::any::type_name::<T>());
        let inner = Arc::new(CuratorInner {
            state: Mutex::new(state),
            metadata,
            producers,
            consumers: RwLock::new(Vec::new()),
            span,
        });

        {
            let _enter = inner.span.enter();
            for producer in &inner.producers {
                debug!("Initializing producer '{}'", producer.name());
                producer.initialize(StateSink {
                    curator: Arc::downgrade(&inner),
                    origin: identity(producer),
                })?;
            }
            info!("State curator ready with {} producer(s)", inner.producers.len());
        }

        let curator = Self { inner };
        curator.update_state_producers();
        Ok(curator)
    }

    /// Current value of a property
    pub fn get_state(&self, property: &str) -> StateResult<PropertyValue> {
        let state = self.inner.state.lock();
        self.inner.metadata.get(&state, property)
    }

    /// Register an observer of future changes
    ///
    /// The current state is not replayed to the new consumer.
    pub fn add_consumer(&self, consumer: Arc<dyn StateConsumer>) {
        self.inner.consumers.write().push(consumer);
    }

    /// Push the full current state to every producer
    ///
    /// Producer failures are logged; remaining producers are still updated.
    pub fn update_state_producers(&self) {
        let _enter = self.inner.span.enter();
        debug!("Updating state producers");
        let state = self.inner.state.lock();
        self.inner.push_to_producers(&state);
    }

    /// Write a property from outside the producer protocol
    ///
    /// Goes through the same change filter as producer updates; every
    /// consumer is notified.
    pub fn set_property(&self, property: &str, value: impl Into<PropertyValue>) -> StateResult<bool> {
        let _enter = self.inner.span.enter();
        self.inner.apply(None, property, value.into())
    }

    /// Read the state under the critical section
    pub fn with_state<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.inner.state.lock();
        f(&*state)
    }

    /// Mutate the state without notifying anyone
    ///
    /// Call [`StateCurator::update_state_producers`] afterwards to resync devices.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.inner.state.lock();
        f(&mut *state)
    }

    /// Current value of every property, in declaration order
    pub fn snapshot(&self) -> Vec<(String, PropertyValue)> {
        let state = self.inner.state.lock();
        self.inner.metadata.snapshot(&state)
    }

    pub fn metadata(&self) -> &Arc<StateMetadata<T>> {
        &self.inner.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PropertyRegistry;
    use std::thread;

    #[derive(Default)]
    struct Sketch {
        brightness: f64,
        invert: bool,
        label: String,
    }

    impl StateType for Sketch {
        fn declare(props: &mut PropertyRegistry<Self>) {
            props
                .double("brightness", |s| s.brightness, |s, v| s.brightness = v)
                .range(0.0, 1.0);
            props.boolean("invert", |s| s.invert, |s, v| s.invert = v);
            props.string("label", |s| s.label.clone(), |s, v| s.label = v);
        }
    }

    /// Producer that keeps its sink and records everything it receives
    #[derive(Default)]
    struct RecordingProducer {
        name: String,
        sink: Mutex<Option<StateSink<Sketch>>>,
        events: Mutex<Vec<String>>,
    }

    impl RecordingProducer {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                ..Default::default()
            })
        }

        fn sink(&self) -> StateSink<Sketch> {
            self.sink.lock().clone().unwrap()
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl StateProducer<Sketch> for RecordingProducer {
        fn name(&self) -> &str {
            &self.name
        }

        fn initialize(&self, sink: StateSink<Sketch>) -> anyhow::Result<()> {
            *self.sink.lock() = Some(sink);
            self.events.lock().push("init".to_string());
            Ok(())
        }

        fn update_state(&self, state: &Sketch) -> anyhow::Result<()> {
            self.events
                .lock()
                .push(format!("push brightness={}", state.brightness));
            Ok(())
        }
    }

    impl StateConsumer for RecordingProducer {
        fn update_state(&self, property: &str, value: &PropertyValue) {
            self.events.lock().push(format!("{}={}", property, value));
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<(String, PropertyValue)>>>, Arc<dyn StateConsumer>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = move |name: &str, value: &PropertyValue| {
            sink.lock().push((name.to_string(), value.clone()));
        };
        (seen, Arc::new(consumer))
    }

    fn curator_with(producers: &[&Arc<RecordingProducer>]) -> StateCurator<Sketch> {
        let producers = producers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn StateProducer<Sketch>>)
            .collect();
        let metadata = StateMetadata::<Sketch>::derive().unwrap();
        StateCurator::new(Sketch::default(), metadata, producers).unwrap()
    }

    #[test]
    fn test_startup_initializes_then_resyncs() {
        let a = RecordingProducer::new("a");
        let b = RecordingProducer::new("b");
        let _curator = curator_with(&[&a, &b]);

        assert_eq!(a.events(), vec!["init", "push brightness=0"]);
        assert_eq!(b.events(), vec!["init", "push brightness=0"]);
    }

    #[test]
    fn test_change_is_applied_and_notified() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);
        let (seen, consumer) = recorder();
        curator.add_consumer(consumer);

        assert!(producer.sink().update_state("brightness", 0.5).unwrap());
        assert_eq!(curator.get_state("brightness").unwrap(), PropertyValue::Double(0.5));
        assert_eq!(
            seen.lock().clone(),
            vec![("brightness".to_string(), PropertyValue::Double(0.5))]
        );
    }

    #[test]
    fn test_same_value_notifies_once() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);
        let (seen, consumer) = recorder();
        curator.add_consumer(consumer);

        let sink = producer.sink();
        assert!(sink.update_state("invert", true).unwrap());
        assert!(!sink.update_state("invert", true).unwrap());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_repeated_nan_notifies_once() {
        let curator = curator_with(&[]);
        let (seen, consumer) = recorder();
        curator.add_consumer(consumer);

        assert!(curator.set_property("brightness", f64::NAN).unwrap());
        assert!(!curator.set_property("brightness", f64::NAN).unwrap());
        assert_eq!(seen.lock().len(), 1);
        curator.with_state(|sketch| assert!(sketch.brightness.is_nan()));
    }

    #[test]
    fn test_echo_suppression() {
        let a = RecordingProducer::new("a");
        let b = RecordingProducer::new("b");
        let curator = curator_with(&[&a, &b]);
        curator.add_consumer(a.clone());
        curator.add_consumer(b.clone());

        a.sink().update_state("label", "from a").unwrap();

        assert!(!a.events().iter().any(|e| e.starts_with("label=")));
        assert_eq!(b.events().last().unwrap(), "label=\"from a\"");

        b.sink().update_state("brightness", 0.25).unwrap();
        assert_eq!(a.events().last().unwrap(), "brightness=0.25");
        assert!(!b.events().iter().any(|e| e.starts_with("brightness=")));
    }

    #[test]
    fn test_late_consumer_gets_no_replay() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);
        producer.sink().update_state("brightness", 0.9).unwrap();

        let (seen, consumer) = recorder();
        curator.add_consumer(consumer);
        assert!(seen.lock().is_empty());

        producer.sink().update_state("brightness", 0.1).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_unknown_names() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);

        assert!(matches!(
            curator.get_state("nope"),
            Err(StateError::UnknownProperty(_))
        ));
        assert!(matches!(
            producer.sink().update_state("nope", 1.0),
            Err(StateError::UnknownMappedProperty(_))
        ));
        assert!(matches!(
            curator.set_property("nope", 1.0),
            Err(StateError::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_type_mismatch_leaves_state_untouched() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);
        let (seen, consumer) = recorder();
        curator.add_consumer(consumer);

        let err = producer.sink().update_state("invert", 1.0).err().unwrap();
        assert!(matches!(err, StateError::TypeMismatch { .. }));
        assert_eq!(curator.get_state("invert").unwrap(), PropertyValue::Boolean(false));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_external_set_notifies_every_consumer() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);
        curator.add_consumer(producer.clone());

        assert!(curator.set_property("brightness", 1.0).unwrap());
        assert_eq!(producer.events().last().unwrap(), "brightness=1");
    }

    #[test]
    fn test_update_state_producers_after_bulk_change() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);

        curator.with_state_mut(|s| s.brightness = 0.75);
        curator.update_state_producers();
        assert_eq!(producer.events().last().unwrap(), "push brightness=0.75");
    }

    #[test]
    fn test_detached_sink() {
        let producer = RecordingProducer::new("surface");
        let curator = curator_with(&[&producer]);
        let sink = producer.sink();
        drop(curator);

        assert!(matches!(
            sink.update_state("brightness", 0.5),
            Err(StateError::Detached)
        ));
    }

    #[test]
    fn test_concurrent_identical_pushes_notify_once() {
        let producers: Vec<Arc<RecordingProducer>> =
            (0..4).map(|i| RecordingProducer::new(&format!("p{}", i))).collect();
        let curator = curator_with(&producers.iter().collect::<Vec<_>>());
        let (seen, consumer) = recorder();
        curator.add_consumer(consumer);

        let handles: Vec<_> = producers
            .iter()
            .map(|p| {
                let sink = p.sink();
                thread::spawn(move || {
                    for _ in 0..100 {
                        sink.update_state("brightness", 0.5).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seen.lock().len(), 1);
    }
}
