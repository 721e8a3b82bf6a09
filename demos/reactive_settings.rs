//! Demonstrates settings that push changes to interested widgets.
//!
//! Widgets subscribe weakly: the settings object never keeps a widget alive,
//! and a closed widget silently stops receiving updates.
//!
//! Run with: cargo run --example reactive_settings

use sovran_attrmap::{
    DuplexChannel, Emitter, EmitterConfig, Key, Observable, StoreError, Subscription, ValueStore,
    ValueUpdate,
};
use std::sync::Arc;

const RENAMED: DuplexChannel<String, String> = DuplexChannel::well_known(0x7365_7474_696e_6773);

struct Settings {
    values: ValueStore,
    font_size: Key<u16>,
    theme: Key<String>,
}

impl Settings {
    fn new() -> Self {
        // A misbehaving widget must not break the others
        let emitter = Emitter::with_config(EmitterConfig::isolating());
        Self {
            values: ValueStore::with_emitter(emitter),
            font_size: Key::register_checked("font size 8..=72", |s: &u16| (8..=72).contains(s)),
            theme: Key::named("theme"),
        }
    }

    fn rename_theme(&self, to: &str) -> Result<(), StoreError> {
        let from = self.values.get_or(&self.theme, "default".to_string())?;
        self.values.set(&self.theme, to.to_string())?;
        self.values.emit_duplex(&RENAMED, from, to.to_string())
    }
}

impl Observable for Settings {
    fn emitter(&self) -> &Emitter {
        self.values.emitter()
    }
}

type Listener = dyn Fn(&ValueUpdate) + Send + Sync;

struct Widget {
    name: &'static str,
    listener: Arc<Box<Listener>>,
    _subscription: Subscription,
}

impl Widget {
    fn open(name: &'static str, settings: &Settings) -> Result<Self, StoreError> {
        let font_size = settings.font_size.clone();
        let theme = settings.theme.clone();
        let listener: Arc<Box<Listener>> = Arc::new(Box::new(move |u: &ValueUpdate| {
            if u.is_for(&font_size) {
                println!("  [{}] font size -> {:?}", name, u.current_as::<u16>());
            } else if u.is_for(&theme) {
                println!("  [{}] theme -> {:?}", name, u.current_as::<String>());
            }
        }));
        let subscription = settings.observe_weak(&ValueStore::CHANGED, &listener)?;
        Ok(Self {
            name,
            listener,
            _subscription: subscription,
        })
    }

    fn close(self) {
        println!("closing {} ({} owner(s))", self.name, Arc::strong_count(&self.listener));
    }
}

fn main() -> Result<(), StoreError> {
    let settings = Settings::new();

    let _renames = settings.observe_duplex(&RENAMED, |from: &String, to: &String| {
        println!("  theme renamed: {} -> {}", from, to);
    })?;

    let editor = Widget::open("editor", &settings)?;
    let sidebar = Widget::open("sidebar", &settings)?;

    println!("set font size 14");
    settings.values.set(&settings.font_size, 14)?;

    println!("set font size 200");
    match settings.values.set(&settings.font_size, 200) {
        Err(e @ StoreError::ArgumentTypeMismatch { .. }) => println!("  rejected: {}", e),
        other => println!("  unexpected: {:?}", other),
    }

    sidebar.close();

    println!("rename theme");
    settings.rename_theme("solarized")?;

    editor.close();
    println!("set font size 16 (nobody listening)");
    settings.values.set(&settings.font_size, 16)?;

    Ok(())
}
