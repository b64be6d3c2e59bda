// Logging utilities for the Cairn PKI stack
//
// This module provides:
// - Component-based structured logging
// - Scheme context tracking through logger inheritance
// - A minimal `env_logger` bootstrap

use log::{debug, error, info, warn};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Pki,
    Keys,
    Trust,
    Signing,
    Config,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Pki => "Pki",
            Component::Keys => "Keys",
            Component::Trust => "Trust",
            Component::Signing => "Signing",
            Component::Config => "Config",
            Component::Custom(name) => name,
        }
    }
}

// Lightweight Display helpers to avoid prefix String allocations
struct ComponentPrefixDisplay {
    parent: Option<Component>,
    component: Component,
}

impl Display for ComponentPrefixDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::Pki => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => write!(f, "{}", self.component.as_str()),
        }
    }
}

struct MaybeSchemeDisplay<'a>(Option<&'a str>);

impl Display for MaybeSchemeDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = self.0 {
            write!(f, "|scheme={scheme}")
        } else {
            Ok(())
        }
    }
}

/// A helper for creating component-specific loggers
#[derive(Debug, Clone)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
    /// Name of the crypto scheme the owning object is bound to
    scheme: Option<String>,
}

impl Logger {
    /// Create a new root logger for a specific component
    pub fn new_root(component: Component) -> Self {
        Self {
            component,
            parent_component: None,
            scheme: None,
        }
    }

    /// Create a child logger for a different component.
    /// The scheme context is inherited.
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            parent_component: Some(self.component),
            scheme: self.scheme.clone(),
        }
    }

    /// Create a logger tagged with a scheme name
    pub fn with_scheme(&self, scheme: impl Into<String>) -> Self {
        Self {
            component: self.component,
            parent_component: self.parent_component,
            scheme: Some(scheme.into()),
        }
    }

    pub fn component(&self) -> Component {
        self.component
    }

    /// Get a reference to the scheme name if available
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Get the full prefix including component and scheme context
    pub fn prefix(&self) -> String {
        format!(
            "{}{}",
            ComponentPrefixDisplay {
                parent: self.parent_component,
                component: self.component,
            },
            MaybeSchemeDisplay(self.scheme())
        )
    }

    fn prefix_display(&self) -> (ComponentPrefixDisplay, MaybeSchemeDisplay<'_>) {
        (
            ComponentPrefixDisplay {
                parent: self.parent_component,
                component: self.component,
            },
            MaybeSchemeDisplay(self.scheme()),
        )
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            let (component, scheme) = self.prefix_display();
            debug!("[{}{}] {}", component, scheme, message.into());
        }
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            let (component, scheme) = self.prefix_display();
            debug!("[{}{}] {}", component, scheme, args);
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            let (component, scheme) = self.prefix_display();
            info!("[{}{}] {}", component, scheme, message.into());
        }
    }

    /// Log an info message using fmt::Arguments
    pub fn info_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Info) {
            let (component, scheme) = self.prefix_display();
            info!("[{}{}] {}", component, scheme, args);
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            let (component, scheme) = self.prefix_display();
            warn!("[{}{}] {}", component, scheme, message.into());
        }
    }

    /// Log a warning using fmt::Arguments
    pub fn warn_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Warn) {
            let (component, scheme) = self.prefix_display();
            warn!("[{}{}] {}", component, scheme, args);
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            let (component, scheme) = self.prefix_display();
            error!("[{}{}] {}", component, scheme, message.into());
        }
    }

    /// Log an error using fmt::Arguments
    pub fn error_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Error) {
            let (component, scheme) = self.prefix_display();
            error!("[{}{}] {}", component, scheme, args);
        }
    }
}

/// Log levels understood by [`LoggingConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// `env_logger` bootstrap configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    level: LogLevel,
    is_test: bool,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Route output through the test harness capture
    pub fn for_tests(mut self) -> Self {
        self.is_test = true;
        self
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Install the global logger. Returns false when a logger was already installed.
    pub fn apply(&self) -> bool {
        env_logger::Builder::new()
            .filter_level(self.level.to_level_filter())
            .is_test(self.is_test)
            .try_init()
            .is_ok()
    }
}
