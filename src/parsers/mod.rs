pub mod format;
pub mod helpers;
pub mod plc_debug;
pub mod plc_tab;
pub mod registry;
pub mod stream;
pub mod template;
pub mod types;

pub use format::{LineFormat, LogFormat};
pub use plc_debug::PlcDebug;
pub use plc_tab::PlcTab;
pub use registry::ParserRegistry;
pub use stream::{CancellationToken, NoProgress, ParseOptions, ProgressSink};
pub use template::TemplateFormat;
pub use types::{
    LineError, ParseError, ParseOutcome, ParseProgress, ParsedLog, Reading, SignalType, TimeSpan,
    Value,
};
