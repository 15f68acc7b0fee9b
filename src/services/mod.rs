// Sales analytics and dashboard aggregation
pub mod analytics;
