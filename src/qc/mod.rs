// Quality control: compatibility rules, media-library scanning and reports

pub mod report;
pub mod rules;
pub mod scanner;
pub mod sniff;

pub use report::{FileReport, Report, RuleGroup, Summary, generate};
pub use rules::{
    CompatibilityRuleSet, Dimensions, RuleKind, RuleSetError, Severity, SeverityMap, parse_list,
};
pub use scanner::{
    Bound, Finding, MediaFilter, MediaKind, QualityScanner, Rule, ScanIter, ScanOutcome,
    StreamKind,
};
pub use sniff::ImageFormat;
