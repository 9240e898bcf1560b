pub mod reasoning_to_think_xml;

pub use reasoning_to_think_xml::{THINK_CLOSE, THINK_OPEN, ThinkSpan, wrap_reasoning};
