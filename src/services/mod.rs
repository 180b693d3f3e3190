pub mod change_detector;
pub mod composition_service;
pub mod csv_import_service;
pub mod export_service;
pub mod query_cache;
pub mod return_calculator;
pub mod xlsx_writer;
