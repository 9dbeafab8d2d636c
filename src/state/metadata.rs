//! Property metadata derivation
//!
//! A state type declares its properties once through [`StateType::declare`].
//! [`StateMetadata::derive`] validates the declarations and caches the
//! resulting descriptor and accessor tables for the lifetime of the process.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::types::{PropertyDescriptor, PropertyKind, PropertyValue, ValueRange};
use crate::error::{StateError, StateResult};

/// A record whose scalar fields can be curated
///
/// # Example
///
/// ```
/// use statesync_midi::state::{PropertyRegistry, StateType};
///
/// struct Sketch {
///     brightness: f64,
///     invert: bool,
/// }
///
/// impl StateType for Sketch {
///     fn declare(props: &mut PropertyRegistry<Self>) {
///         props
///             .double("brightness", |s| s.brightness, |s, v| s.brightness = v)
///             .range(0.0, 1.0);
///         props
///             .boolean("invert", |s| s.invert, |s, v| s.invert = v)
///             .animatable(false);
///     }
/// }
/// ```
pub trait StateType: Send + Sized + 'static {
    fn declare(props: &mut PropertyRegistry<Self>);
}

/// Typed getter/setter pair for one property
pub enum Accessor<T> {
    Double {
        get: fn(&T) -> f64,
        set: fn(&mut T, f64),
    },
    Boolean {
        get: fn(&T) -> bool,
        set: fn(&mut T, bool),
    },
    String {
        get: fn(&T) -> String,
        set: fn(&mut T, String),
    },
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Accessor<T> {}

impl<T> Accessor<T> {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Accessor::Double { .. } => PropertyKind::Double,
            Accessor::Boolean { .. } => PropertyKind::Boolean,
            Accessor::String { .. } => PropertyKind::String,
        }
    }

    /// Read the current value
    pub fn get(&self, state: &T) -> PropertyValue {
        match self {
            Accessor::Double { get, .. } => PropertyValue::Double(get(state)),
            Accessor::Boolean { get, .. } => PropertyValue::Boolean(get(state)),
            Accessor::String { get, .. } => PropertyValue::String(get(state)),
        }
    }

    /// Write a value of the matching kind
    ///
    /// Returns `false` (and leaves the state untouched) on a kind mismatch.
    pub fn set(&self, state: &mut T, value: PropertyValue) -> bool {
        match (self, value) {
            (Accessor::Double { set, .. }, PropertyValue::Double(v)) => set(state, v),
            (Accessor::Boolean { set, .. }, PropertyValue::Boolean(v)) => set(state, v),
            (Accessor::String { set, .. }, PropertyValue::String(v)) => set(state, v),
            _ => return false,
        }
        true
    }
}

/// One declared property, before validation
pub struct PropertyDecl<T> {
    name: String,
    accessor: Accessor<T>,
    range: Option<ValueRange>,
    animatable: bool,
}

impl<T> PropertyDecl<T> {
    /// Declare the inclusive range of a Double property
    pub fn range(&mut self, min: f64, max: f64) -> &mut Self {
        self.range = Some(ValueRange { min, max });
        self
    }

    /// Mark whether a transition subsystem may interpolate this property
    pub fn animatable(&mut self, animatable: bool) -> &mut Self {
        self.animatable = animatable;
        self
    }
}

/// Collects property declarations of a state type
pub struct PropertyRegistry<T> {
    decls: Vec<PropertyDecl<T>>,
}

impl<T> PropertyRegistry<T> {
    fn new() -> Self {
        Self { decls: Vec::new() }
    }

    fn push(&mut self, name: &str, accessor: Accessor<T>) -> &mut PropertyDecl<T> {
        self.decls.push(PropertyDecl {
            name: name.to_string(),
            accessor,
            range: None,
            animatable: true,
        });
        let last = self.decls.len() - 1;
        &mut self.decls[last]
    }

    /// Declare a Double property; a range must follow
    pub fn double(
        &mut self,
        name: &str,
        get: fn(&T) -> f64,
        set: fn(&mut T, f64),
    ) -> &mut PropertyDecl<T> {
        self.push(name, Accessor::Double { get, set })
    }

    pub fn boolean(
        &mut self,
        name: &str,
        get: fn(&T) -> bool,
        set: fn(&mut T, bool),
    ) -> &mut PropertyDecl<T> {
        self.push(name, Accessor::Boolean { get, set })
    }

    pub fn string(
        &mut self,
        name: &str,
        get: fn(&T) -> String,
        set: fn(&mut T, String),
    ) -> &mut PropertyDecl<T> {
        self.push(name, Accessor::String { get, set })
    }
}

/// Descriptor and accessor tables of a state type
pub struct StateMetadata<T> {
    descriptors: Vec<PropertyDescriptor>,
    accessors: Vec<Accessor<T>>,
    index: HashMap<String, usize>,
}

/// Derived metadata per state type, shared for the process lifetime
static METADATA_CACHE: Lazy<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl<T: StateType> StateMetadata<T> {
    /// Derive (or fetch the cached) metadata for `T`
    ///
    /// Repeated calls return the same `Arc`. A failing declaration is
    /// reported on every call and never cached.
    pub fn derive() -> StateResult<Arc<Self>> {
        let type_id = TypeId::of::<T>();
        let mut cache = METADATA_CACHE.lock();

        if let Some(cached) = cache.get(&type_id) {
            if let Ok(metadata) = cached.clone().downcast::<Self>() {
                return Ok(metadata);
            }
        }

        let metadata = Arc::new(Self::build()?);
        cache.insert(type_id, metadata.clone());
        debug!(
            "Derived state metadata for {} ({} properties)",
            std::any::type_name::<T>(),
            metadata.len()
        );
        Ok(metadata)
    }

    /// Build and validate the tables without touching the cache
    pub fn build() -> StateResult<Self> {
        let mut registry = PropertyRegistry::new();
        T::declare(&mut registry);

        let mut descriptors = Vec::with_capacity(registry.decls.len());
        let mut accessors = Vec::with_capacity(registry.decls.len());
        let mut index = HashMap::new();

        for decl in registry.decls {
            let kind = decl.accessor.kind();
            match (kind, decl.range) {
                (PropertyKind::Double, None) => {
                    return Err(StateError::MissingRange(decl.name));
                }
                (PropertyKind::Double, Some(range)) if !range.is_valid() => {
                    return Err(StateError::InvalidRange {
                        name: decl.name,
                        min: range.min,
                        max: range.max,
                    });
                }
                (PropertyKind::Boolean | PropertyKind::String, Some(_)) => {
                    return Err(StateError::UnexpectedRange(decl.name));
                }
                _ => {}
            }

            if index.contains_key(&decl.name) {
                return Err(StateError::DuplicateProperty(decl.name));
            }

            index.insert(decl.name.clone(), descriptors.len());
            descriptors.push(PropertyDescriptor::new(
                decl.name,
                kind,
                decl.range,
                decl.animatable,
            ));
            accessors.push(decl.accessor);
        }

        Ok(Self {
            descriptors,
            accessors,
            index,
        })
    }
}

impl<T> StateMetadata<T> {
    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn accessor(&self, name: &str) -> Option<Accessor<T>> {
        self.index.get(name).map(|&i| self.accessors[i])
    }

    /// All descriptors in declaration order
    pub fn descriptors(&self) -> &[PropertyDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Read a property by name
    pub fn get(&self, state: &T, name: &str) -> StateResult<PropertyValue> {
        self.accessor(name)
            .map(|accessor| accessor.get(state))
            .ok_or_else(|| StateError::UnknownProperty(name.to_string()))
    }

    /// Write a property by name, checking the value kind
    pub fn set(&self, state: &mut T, name: &str, value: PropertyValue) -> StateResult<()> {
        let accessor = self
            .accessor(name)
            .ok_or_else(|| StateError::UnknownProperty(name.to_string()))?;
        let actual = value.kind();
        if accessor.set(state, value) {
            Ok(())
        } else {
            Err(StateError::TypeMismatch {
                name: name.to_string(),
                expected: accessor.kind(),
                actual,
            })
        }
    }

    /// Current value of every property, in declaration order
    pub fn snapshot(&self, state: &T) -> Vec<(String, PropertyValue)> {
        self.descriptors
            .iter()
            .zip(&self.accessors)
            .map(|(descriptor, accessor)| (descriptor.name().to_string(), accessor.get(state)))
            .collect()
    }
}
