// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::env;

use std::{fmt, sync::atomic::AtomicUsize, write};

use std::fmt::Write;
use tracing::Level;
use tracing::{field::Visit, Id, Subscriber};
use tracing_core::Field;

use crate::environment;

pub struct StringVisitor<'a> {
    string: &'a mut String,
}
impl<'a> StringVisitor<'a> {
    pub(crate) fn new(string: &'a mut String) -> Self {
        StringVisitor { string }
    }
}

impl Visit for StringVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let _ = if field.name() == "message" {
            write!(self.string, "{value:?} ")
        } else {
            write!(self.string, "{} = {:?}; ", field.name(), value)
        };
    }
}

struct LogFilter {
    target: Option<String>,
    level: Option<Level>,
}

pub struct MinimalTracer {
    enabled: bool,
    filters: Vec<LogFilter>,
}

fn string_to_level(string: &str) -> Option<Level> {
    match string.to_lowercase().as_str() {
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "warn" | "warning" => Some(Level::WARN),
        "trace" => Some(Level::TRACE),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn parse_filters(value: &str) -> Vec<LogFilter> {
    value
        .split(',')
        .filter(|filter| !filter.is_empty())
        .map(|filter| match filter.split_once('=') {
            Some((target, level)) => LogFilter {
                target: Some(target.to_string()),
                level: string_to_level(level),
            },
            None => match string_to_level(filter) {
                Some(level) => LogFilter {
                    target: None,
                    level: Some(level),
                },
                None => LogFilter {
                    target: Some(filter.to_string()),
                    level: None,
                },
            },
        })
        .collect()
}

impl MinimalTracer {
    /// Installs the subscriber, enabled only when `BYTECACHE_LOG` is set.
    pub fn register() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
        let tracer = match env::var(environment::ENV_BYTECACHE_LOG) {
            Ok(value) => MinimalTracer {
                enabled: true,
                filters: parse_filters(&value),
            },
            Err(_) => MinimalTracer {
                enabled: false,
                filters: Vec::new(),
            },
        };

        tracing::subscriber::set_global_default(tracer)
    }
}

static AUTO_ID: AtomicUsize = AtomicUsize::new(1);

impl Subscriber for MinimalTracer {
    fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
        if self.enabled {
            if self.filters.is_empty() {
                return true;
            }

            let mut matches: bool;
            for filter in &self.filters {
                matches = true;
                if let Some(level) = filter.level {
                    if metadata.level() != &level {
                        matches = false;
                    }
                }
                if let Some(target) = &filter.target {
                    if !metadata.target().starts_with(target) {
                        matches = false;
                    }
                }
                if matches {
                    return true;
                }
            }
            return false;
        }
        false
    }

    fn new_span(&self, _span: &tracing_core::span::Attributes<'_>) -> tracing_core::span::Id {
        Id::from_u64(AUTO_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed) as u64)
    }

    fn record(&self, _span: &tracing_core::span::Id, _values: &tracing_core::span::Record<'_>) {}

    fn record_follows_from(
        &self,
        _span: &tracing_core::span::Id,
        _follows: &tracing_core::span::Id,
    ) {
    }

    fn event(&self, event: &tracing::Event<'_>) {
        let metadata = event.metadata();

        let level = metadata.level();
        let target = metadata.target();

        let mut text = String::new();

        let mut visitor = StringVisitor::new(&mut text);
        event.record(&mut visitor);

        // stdout carries compiled output in host mode
        eprintln!("{level} {target}: {text}");
    }

    fn enter(&self, _span: &tracing_core::span::Id) {}

    fn exit(&self, _span: &tracing_core::span::Id) {}
}
