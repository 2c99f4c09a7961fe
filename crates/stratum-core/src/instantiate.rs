//! Obtaining a living plugin instance from a resolved main class.
//!
//! Two shapes are supported, tried in order: a singleton object exposing its
//! one instance through a well-known static slot (no constructor runs), and
//! a regular class with a public zero-argument constructor. The shape is
//! inspected once per main class and the decision cached on the plugin
//! record as an [`InstanceProvider`].
//!
//! Shape inspection itself is a seam: the engine only consumes the
//! [`ShapeInspector`] trait. The shipped [`SymbolShapeInspector`] reads the
//! well-known exported symbols out of the plugin's native companion library.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use stratum_sdk::{ClassName, ManagedPlugin, PluginResult, CONSTRUCTOR_SYMBOL, SINGLETON_SYMBOL};
use tracing::debug;

use crate::class::LoadedClass;
use crate::error::InstantiationError;

/// Zero-argument plugin factory.
pub type Constructor = Box<dyn Fn() -> PluginResult<Arc<dyn ManagedPlugin>> + Send + Sync>;

/// Declared shape of a main class, as reported by a [`ShapeInspector`].
pub struct ClassShape {
    /// Instance read from the well-known singleton slot, when the class
    /// exposes one.
    pub singleton: Option<Arc<dyn ManagedPlugin>>,
    /// Zero-argument constructor, when the class declares one.
    pub constructor: Option<Constructor>,
    /// Whether the declared constructor is public.
    pub constructor_public: bool,
}

/// Inspects a resolved class's declared shape.
///
/// The reflection analog: how slots and constructors are physically reached
/// is the inspector's business.
pub trait ShapeInspector: Send + Sync {
    fn inspect(&self, class: &LoadedClass) -> Result<ClassShape, InstantiationError>;
}

/// Cached instantiation decision for one main class.
pub enum InstanceProvider {
    /// The class is a singleton object; every instantiation returns the one
    /// instance read from its static slot. No constructor ever runs.
    Singleton {
        class: ClassName,
        instance: Arc<dyn ManagedPlugin>,
    },
    /// The class has a public zero-argument constructor.
    Constructible {
        class: ClassName,
        constructor: Constructor,
    },
}

impl InstanceProvider {
    /// Decide the provider for a resolved main class.
    pub fn for_class(
        inspector: &dyn ShapeInspector,
        class: &LoadedClass,
    ) -> Result<Self, InstantiationError> {
        let shape = inspector.inspect(class)?;

        if let Some(instance) = shape.singleton {
            debug!(class = %class.name(), "using singleton slot instance");
            return Ok(InstanceProvider::Singleton {
                class: class.name().clone(),
                instance,
            });
        }

        match shape.constructor {
            Some(_) if !shape.constructor_public => {
                Err(InstantiationError::InaccessibleConstructor {
                    class: class.name().clone(),
                })
            }
            Some(constructor) => Ok(InstanceProvider::Constructible {
                class: class.name().clone(),
                constructor,
            }),
            None => Err(InstantiationError::MissingConstructor {
                class: class.name().clone(),
            }),
        }
    }

    /// Obtain an instance.
    pub fn instance(&self) -> Result<Arc<dyn ManagedPlugin>, InstantiationError> {
        match self {
            InstanceProvider::Singleton { instance, .. } => Ok(instance.clone()),
            InstanceProvider::Constructible { class, constructor } => {
                constructor().map_err(|e| InstantiationError::ConstructorFailed {
                    class: class.clone(),
                    source: e,
                })
            }
        }
    }

    /// The main class this provider was decided for.
    pub fn class(&self) -> &ClassName {
        match self {
            InstanceProvider::Singleton { class, .. } => class,
            InstanceProvider::Constructible { class, .. } => class,
        }
    }
}

type SingletonSlotFn = unsafe extern "C" fn() -> *mut Arc<dyn ManagedPlugin>;
type ConstructorFn = unsafe extern "C" fn() -> *mut Arc<dyn ManagedPlugin>;

/// Inspector backed by the plugin's native companion library.
///
/// Convention: next to `plugin.jar` sits `plugin.<dylib-ext>`, exporting
/// [`SINGLETON_SYMBOL`] for singleton objects and [`CONSTRUCTOR_SYMBOL`] for
/// constructible classes. Both symbols return an owned, leaked
/// `Arc<dyn ManagedPlugin>` pointer, or null. Loaded libraries are kept
/// alive for the process lifetime, mirroring the never-unload rule for
/// defined classes.
#[derive(Default)]
pub struct SymbolShapeInspector {
    libraries: Mutex<Vec<&'static libloading::Library>>,
}

impl SymbolShapeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    fn companion_path(class: &LoadedClass) -> PathBuf {
        let ext = if cfg!(target_os = "windows") {
            "dll"
        } else if cfg!(target_os = "macos") {
            "dylib"
        } else {
            "so"
        };
        class.source().with_extension(ext)
    }
}

impl ShapeInspector for SymbolShapeInspector {
    fn inspect(&self, class: &LoadedClass) -> Result<ClassShape, InstantiationError> {
        let path = Self::companion_path(class);
        if !path.exists() {
            return Err(InstantiationError::NotInstantiable {
                class: class.name().clone(),
                reason: format!("no native companion library at {}", path.display()),
            });
        }

        // Never unloaded: symbols stay valid for the process lifetime.
        let library: &'static libloading::Library = unsafe {
            Box::leak(Box::new(libloading::Library::new(&path).map_err(|e| {
                InstantiationError::NotInstantiable {
                    class: class.name().clone(),
                    reason: e.to_string(),
                }
            })?))
        };
        self.libraries.lock().push(library);

        let singleton = if class.declared_singleton() {
            let slot = unsafe { library.get::<SingletonSlotFn>(SINGLETON_SYMBOL) };
            match slot {
                Ok(slot) => {
                    let raw = unsafe { slot() };
                    if raw.is_null() {
                        return Err(InstantiationError::InaccessibleSingleton {
                            class: class.name().clone(),
                            reason: "singleton slot returned null".to_string(),
                        });
                    }
                    Some(*unsafe { Box::from_raw(raw) })
                }
                // Slot absent after all; fall back to the constructor shape.
                Err(_) => None,
            }
        } else {
            None
        };

        let constructor = unsafe { library.get::<ConstructorFn>(CONSTRUCTOR_SYMBOL) }
            .ok()
            .map(|symbol| {
                let raw_fn = *symbol;
                let class_name = class.name().clone();
                Box::new(move || {
                    let raw = unsafe { raw_fn() };
                    if raw.is_null() {
                        return Err(stratum_sdk::PluginError::ConstructionFailed(format!(
                            "factory of {class_name} returned null"
                        )));
                    }
                    Ok(*unsafe { Box::from_raw(raw) })
                }) as Constructor
            });

        Ok(ClassShape {
            singleton,
            constructor,
            constructor_public: true,
        })
    }
}
