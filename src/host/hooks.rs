use crate::foundation::core::SpriteId;
use crate::host::renderer::Renderer;

/// Lifecycle notifications the host delivers to extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A sprite (or clone) was deleted.
    SpriteRemoved(SpriteId),
    /// Another extension was loaded; it may have replaced the host's frame hooks.
    ExtensionAdded(String),
}

/// Code run by the host before it composites each frame.
pub trait FrameObserver {
    fn before_frame(&mut self, renderer: &mut dyn Renderer);
}

/// Registry of named frame observers.
///
/// Keys act as install markers: installing an already present key is refused, which keeps a
/// re-install after a host reload from stacking duplicate observers.
#[derive(Default)]
pub struct FrameHooks {
    observers: Vec<(String, Box<dyn FrameObserver>)>,
}

impl FrameHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` under `key`. Returns `false` if the key was already installed.
    pub fn install(&mut self, key: &str, observer: Box<dyn FrameObserver>) -> bool {
        if self.is_installed(key) {
            return false;
        }
        self.observers.push((key.to_string(), observer));
        true
    }

    pub fn is_installed(&self, key: &str) -> bool {
        self.observers.iter().any(|(k, _)| k == key)
    }

    pub fn uninstall(&mut self, key: &str) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(k, _)| k != key);
        self.observers.len() != before
    }

    /// Drop every observer. Hosts do this when they swap their draw pipeline.
    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Run every observer in install order.
    pub fn run_before_frame(&mut self, renderer: &mut dyn Renderer) {
        for (_, observer) in &mut self.observers {
            observer.before_frame(renderer);
        }
    }
}

impl std::fmt::Debug for FrameHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHooks")
            .field(
                "keys",
                &self.observers.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
