//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (env filter + fmt layer)
//! - Color request log lines by route so each host is easy to pick out
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the default filter
//! - Colors are a visual aid only; the route index is also logged as a field

use colored::{Color, ColoredString, Colorize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "devproxy=info,tower_http=warn";

const ROUTE_PALETTE: [Color; 5] = [
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Cyan,
    Color::Blue,
];

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Palette color for the route at `index`.
pub fn route_color(index: usize) -> Color {
    ROUTE_PALETTE[index % ROUTE_PALETTE.len()]
}

/// `host` painted in its route's color.
pub fn paint_route(index: usize, host: &str) -> ColoredString {
    host.color(route_color(index))
}

/// `host` painted as a routing miss.
pub fn paint_miss(host: &str) -> ColoredString {
    host.red()
}
