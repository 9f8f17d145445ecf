//! Periodic usage estimation and eviction, so a tenant with an unbounded
//! assertion rate cannot grow working memory without limit.

use rete_fact::FactId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict by insertion order — an approximation of least-recently-used,
    /// since this engine does not track reads.
    Lru,
    /// Evict by ascending fact id.
    Oldest,
    /// Uniform random selection.
    Random,
}

/// Per-tenant memory budget. `None` limit means memory management is
/// disabled for this engine.
#[derive(Debug, Clone, Copy)]
pub struct MemoryLimit {
    pub bytes: usize,
    pub check_interval: u64,
    pub policy: EvictionPolicy,
}

/// A usage estimate sampled at a memory-check point.
#[derive(Debug, Clone, Copy)]
pub struct UsageEstimate {
    pub working_memory_bytes: usize,
    pub agenda_bytes: usize,
    pub refraction_bytes: usize,
}

impl UsageEstimate {
    pub fn total(&self) -> usize {
        self.working_memory_bytes + self.agenda_bytes + self.refraction_bytes
    }
}

/// Decide whether eviction should run this operation, given how many
/// operations have elapsed since the last check.
pub fn should_check(ops_since_last_check: u64, limit: &MemoryLimit) -> bool {
    limit.check_interval > 0 && ops_since_last_check >= limit.check_interval
}

/// Suggested number of facts to evict: excess bytes over the limit,
/// divided by the average fact size, capped at half of current working
/// memory so a single eviction pass can never empty the tenant's state.
pub fn suggested_eviction_count(usage: &UsageEstimate, limit: &MemoryLimit, fact_count: usize) -> usize {
    if fact_count == 0 || usage.total() <= limit.bytes {
        return 0;
    }
    let excess = usage.total() - limit.bytes;
    let avg_fact_size = (usage.working_memory_bytes / fact_count).max(1);
    let suggested = excess.div_ceil(avg_fact_size);
    suggested.min(fact_count / 2).max(if suggested > 0 { 1 } else { 0 })
}

/// Choose `count` fact ids to evict from `candidates`, ordered per the
/// policy's convention. `lru` and `oldest` callers pass ids pre-ordered
/// (insertion order, ascending respectively) and this simply takes a
/// prefix; `random` shuffles first.
pub fn select_victims(policy: EvictionPolicy, mut candidates: Vec<FactId>, count: usize) -> Vec<FactId> {
    if policy == EvictionPolicy::Random {
        fastrand::shuffle(&mut candidates);
    }
    candidates.truncate(count);
    candidates
}
