//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod json_report_adapter;

use crate::ports::report_port::ReportPort;
use std::path::Path;

/// Pick a report writer from the output file extension. Anything other
/// than `.json` gets CSV.
pub fn report_adapter_for(path: &Path) -> Box<dyn ReportPort> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            Box::new(json_report_adapter::JsonReportAdapter)
        }
        _ => Box::new(csv_report_adapter::CsvReportAdapter),
    }
}
