// Pipeline ingestion: delimited report files into a record table

pub mod csv_reader;

pub use csv_reader::CsvTableReader;
