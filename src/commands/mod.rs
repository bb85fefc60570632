pub mod generate_chart;

pub use generate_chart::generate_chart_file;
