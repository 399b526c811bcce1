pub mod command_parser;
pub mod common;
pub mod cooked;
pub mod emoji;
pub mod html;

pub use command_parser::{ParsedCommand, parse_command};
pub use common::{escape_html, normalize_url};
pub use cooked::{CookedOptions, extract_image_sources, render_cooked};
