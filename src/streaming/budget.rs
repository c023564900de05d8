//! Byte budgets for the point tier (CPU) and the batch tier (GPU)
//!
//! A limit of zero means unlimited and never reports pressure.

/// Pressure above which forced eviction starts
pub const EVICTION_PRESSURE: f32 = 0.9;

const MB: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct TierUsage {
    limit: usize,
    resident: usize,
}

impl TierUsage {
    fn pressure(&self) -> f32 {
        match self.limit {
            0 => 0.0,
            limit => self.resident as f32 / limit as f32,
        }
    }
}

/// Resident bytes of both cache tiers against their limits
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemoryBudget {
    points: TierUsage,
    batches: TierUsage,
}

impl MemoryBudget {
    /// # Arguments
    /// * `cpu_budget_mb` - Limit for resident raw points
    /// * `gpu_budget_mb` - Limit for resident batches
    pub fn new(cpu_budget_mb: usize, gpu_budget_mb: usize) -> Self {
        Self::from_bytes(cpu_budget_mb.saturating_mul(MB), gpu_budget_mb.saturating_mul(MB))
    }

    pub fn from_bytes(cpu_budget_bytes: usize, gpu_budget_bytes: usize) -> Self {
        Self {
            points: TierUsage { limit: cpu_budget_bytes, resident: 0 },
            batches: TierUsage { limit: gpu_budget_bytes, resident: 0 },
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Account for a batch set entering the resident tier
    pub fn add_gpu(&mut self, bytes: usize) {
        self.batches.resident = self.batches.resident.saturating_add(bytes);
    }

    /// Account for a batch set leaving the resident tier
    pub fn remove_gpu(&mut self, bytes: usize) {
        self.batches.resident = self.batches.resident.saturating_sub(bytes);
    }

    /// The loader owns the point tier, so its byte count is mirrored here
    pub fn set_cpu_used(&mut self, bytes: usize) {
        self.points.resident = bytes;
    }

    pub fn cpu_used(&self) -> usize {
        self.points.resident
    }

    pub fn gpu_used(&self) -> usize {
        self.batches.resident
    }

    /// Resident point bytes over the limit; above 1.0 means over budget
    pub fn cpu_pressure(&self) -> f32 {
        self.points.pressure()
    }

    /// Resident batch bytes over the limit; above 1.0 means over budget
    pub fn gpu_pressure(&self) -> f32 {
        self.batches.pressure()
    }

    pub fn should_evict_cpu(&self) -> bool {
        self.cpu_pressure() > EVICTION_PRESSURE
    }

    pub fn should_evict_gpu(&self) -> bool {
        self.gpu_pressure() > EVICTION_PRESSURE
    }

    pub fn should_evict(&self) -> bool {
        self.should_evict_cpu() || self.should_evict_gpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_budget_has_no_pressure() {
        let budget = MemoryBudget::new(64, 256);
        assert_eq!((budget.cpu_used(), budget.gpu_used()), (0, 0));
        assert!(!budget.should_evict());
    }

    #[test]
    fn test_batch_bytes_saturate_at_zero() {
        let mut budget = MemoryBudget::from_bytes(0, 4096);
        budget.add_gpu(3000);
        budget.remove_gpu(1000);
        assert_eq!(budget.gpu_used(), 2000);

        budget.remove_gpu(10_000);
        assert_eq!(budget.gpu_used(), 0);
    }

    #[test]
    fn test_point_tier_pressure() {
        let mut budget = MemoryBudget::from_bytes(1000, 0);
        budget.set_cpu_used(900);
        // Exactly at the threshold is not over it
        assert!(!budget.should_evict_cpu());

        budget.set_cpu_used(901);
        assert!(budget.should_evict_cpu());
        assert!(budget.should_evict());
        assert!(!budget.should_evict_gpu());
    }

    #[test]
    fn test_batch_tier_pressure() {
        let mut budget = MemoryBudget::new(1, 2);
        budget.add_gpu(MB);
        assert!((budget.gpu_pressure() - 0.5).abs() < 1e-6);

        budget.add_gpu(MB);
        assert!(budget.gpu_pressure() >= 1.0);
        assert!(budget.should_evict_gpu());
        assert!(!budget.should_evict_cpu());
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let mut budget = MemoryBudget::unlimited();
        budget.add_gpu(usize::MAX);
        budget.set_cpu_used(usize::MAX);
        assert_eq!(budget.cpu_pressure(), 0.0);
        assert_eq!(budget.gpu_pressure(), 0.0);
        assert!(!budget.should_evict());
    }
}
