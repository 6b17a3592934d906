use serde::{Deserialize, Serialize};

use crate::domain::PerformanceRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceListResponse {
    pub success: bool,
    pub count: usize,
    pub performances: Vec<PerformanceRecord>,
}

impl PerformanceListResponse {
    pub fn new(performances: Vec<PerformanceRecord>) -> Self {
        Self {
            success: true,
            count: performances.len(),
            performances,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceDetailResponse {
    pub success: bool,
    pub performance: PerformanceRecord,
}

impl PerformanceDetailResponse {
    pub fn new(performance: PerformanceRecord) -> Self {
        Self {
            success: true,
            performance,
        }
    }
}
