//! Route Fitness Optimizer — evolutionary re-ranking of internal routes
//!
//! Every registered route accumulates an access count and a running mean
//! of observed load time. A periodic evolve step (see
//! `background::RouteEvolver`) re-scores each route's fitness from those
//! observations, occasionally applies a small bounded mutation, and
//! advances the route's generation. Fitness drives `select_route`, a
//! roulette-wheel pick across candidates.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RoutingConfig;

/// Fitness boost applied by a mutation, capped at 1.0.
const MUTATION_BOOST: f64 = 1.05;

/// A mutation applied to a route during an evolve step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Generation the mutation was applied in
    pub generation: u64,
    pub description: String,
}

/// Observed performance and evolutionary state of one route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub path: String,
    /// Derived performance score in [0, 1]
    pub fitness: f64,
    pub access_count: u64,
    pub average_load_time: f64,
    pub mutations: Vec<Mutation>,
    pub generation: u64,
}

impl RouteRecord {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            fitness: 0.5,
            access_count: 0,
            average_load_time: 0.0,
            mutations: Vec::new(),
            generation: 0,
        }
    }
}

/// Tracks per-route performance and periodically re-scores fitness.
pub struct RouteFitnessOptimizer {
    config: RoutingConfig,
    routes: Mutex<HashMap<String, RouteRecord>>,
}

impl RouteFitnessOptimizer {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            config,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Register a route. Idempotent — an existing record is untouched.
    pub fn register_route(&self, path: &str) {
        let mut routes = self.lock();
        routes
            .entry(path.to_string())
            .or_insert_with(|| RouteRecord::new(path));
    }

    /// Record one access and fold its load time into the running mean.
    /// Unregistered paths are ignored. Fitness is deliberately not
    /// recomputed here — only the evolve step scores routes.
    pub fn record_access(&self, path: &str, load_time_ms: f64) {
        let mut routes = self.lock();
        let Some(route) = routes.get_mut(path) else {
            return;
        };
        route.access_count += 1;
        route.average_load_time +=
            (load_time_ms - route.average_load_time) / route.access_count as f64;
        debug!(
            path,
            count = route.access_count,
            avg_ms = route.average_load_time,
            "route access recorded"
        );
    }

    /// Run one evolve step with a thread-local RNG.
    pub fn evolve(&self) {
        self.evolve_with_rng(&mut rand::thread_rng());
    }

    /// Run one evolve step: re-score fitness for every route, roll for
    /// mutations, advance generations. RNG injected for deterministic
    /// tests.
    pub fn evolve_with_rng<R: Rng>(&self, rng: &mut R) {
        let mut routes = self.lock();
        let mut mutated = 0usize;
        for route in routes.values_mut() {
            route.generation += 1;
            route.fitness = self.score(route);

            if rng.gen::<f64>() < self.config.mutation_rate {
                route.fitness = (route.fitness * MUTATION_BOOST).min(1.0);
                route.mutations.push(Mutation {
                    generation: route.generation,
                    description: format!("gen{}_optimization", route.generation),
                });
                mutated += 1;
            }
        }
        info!(routes = routes.len(), mutated, "route evolution step complete");
    }

    /// One route's record.
    pub fn route(&self, path: &str) -> Option<RouteRecord> {
        self.lock().get(path).cloned()
    }

    /// All routes, fittest first.
    pub fn all_routes(&self) -> Vec<RouteRecord> {
        let mut routes: Vec<_> = self.lock().values().cloned().collect();
        routes.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        routes
    }

    /// Fitness-weighted random pick among `candidates` (roulette wheel).
    /// Unregistered candidates are skipped; returns `None` only when no
    /// candidate is registered.
    pub fn select_route(&self, candidates: &[&str]) -> Option<String> {
        self.select_route_with_rng(candidates, &mut rand::thread_rng())
    }

    pub fn select_route_with_rng<R: Rng>(
        &self,
        candidates: &[&str],
        rng: &mut R,
    ) -> Option<String> {
        let routes = self.lock();
        let known: Vec<&RouteRecord> = candidates
            .iter()
            .filter_map(|path| routes.get(*path))
            .collect();
        if known.is_empty() {
            return None;
        }

        let total: f64 = known.iter().map(|r| r.fitness).sum();
        if total <= 0.0 {
            return Some(known[0].path.clone());
        }
        let mut spin = rng.gen::<f64>() * total;
        for route in &known {
            spin -= route.fitness;
            if spin <= 0.0 {
                return Some(route.path.clone());
            }
        }
        Some(known[0].path.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RouteRecord>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fitness = weighted sum of a load score and a saturating access
    /// score, both in [0, 1]. Monotone: non-increasing in average load
    /// time, non-decreasing in access count.
    fn score(&self, route: &RouteRecord) -> f64 {
        let load_score = 1.0 - (route.average_load_time / self.config.max_load_time_ms).min(1.0);
        let access_score =
            route.access_count as f64 / (route.access_count as f64 + self.config.access_saturation);
        let w = self.config.load_weight;
        (w * load_score + (1.0 - w) * access_score).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Mutation disabled so fitness comparisons are exact.
    fn no_mutation() -> RoutingConfig {
        RoutingConfig {
            mutation_rate: 0.0,
            ..RoutingConfig::default()
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn registration_is_idempotent() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/health");
        opt.record_access("/health", 100.0);
        opt.register_route("/health");
        let route = opt.route("/health").expect("registered");
        assert_eq!(route.access_count, 1);
    }

    #[test]
    fn unregistered_access_is_ignored() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.record_access("/ghost", 100.0);
        assert!(opt.route("/ghost").is_none());
    }

    #[test]
    fn running_mean_matches_arithmetic_mean() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/r");
        for load in [100.0, 200.0, 300.0] {
            opt.record_access("/r", load);
        }
        let route = opt.route("/r").expect("registered");
        assert_eq!(route.access_count, 3);
        assert!((route.average_load_time - 200.0).abs() < 1e-9);
    }

    #[test]
    fn fitness_only_changes_on_evolve() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/r");
        opt.record_access("/r", 4900.0);
        assert!((opt.route("/r").expect("registered").fitness - 0.5).abs() < 1e-9);

        opt.evolve_with_rng(&mut rng());
        assert!(opt.route("/r").expect("registered").fitness < 0.5);
    }

    #[test]
    fn lower_load_time_scores_higher_at_fixed_access_count() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/fast");
        opt.register_route("/slow");
        for _ in 0..10 {
            opt.record_access("/fast", 50.0);
            opt.record_access("/slow", 2000.0);
        }
        opt.evolve_with_rng(&mut rng());

        let fast = opt.route("/fast").expect("registered").fitness;
        let slow = opt.route("/slow").expect("registered").fitness;
        assert!(fast >= slow, "fast {fast} should outrank slow {slow}");
    }

    #[test]
    fn higher_access_count_scores_higher_at_fixed_load_time() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/popular");
        opt.register_route("/rare");
        for _ in 0..100 {
            opt.record_access("/popular", 100.0);
        }
        opt.record_access("/rare", 100.0);
        opt.evolve_with_rng(&mut rng());

        let popular = opt.route("/popular").expect("registered").fitness;
        let rare = opt.route("/rare").expect("registered").fitness;
        assert!(popular > rare, "popular {popular} should outrank rare {rare}");
    }

    #[test]
    fn evolve_advances_every_generation() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/a");
        opt.register_route("/b");
        opt.evolve_with_rng(&mut rng());
        opt.evolve_with_rng(&mut rng());
        assert_eq!(opt.route("/a").expect("registered").generation, 2);
        assert_eq!(opt.route("/b").expect("registered").generation, 2);
    }

    #[test]
    fn mutation_appends_record_and_caps_fitness() {
        let cfg = RoutingConfig {
            mutation_rate: 1.0, // always mutate
            ..RoutingConfig::default()
        };
        let opt = RouteFitnessOptimizer::new(cfg);
        opt.register_route("/r");
        for _ in 0..1000 {
            opt.record_access("/r", 1.0);
        }
        opt.evolve_with_rng(&mut rng());

        let route = opt.route("/r").expect("registered");
        assert_eq!(route.mutations.len(), 1);
        assert_eq!(route.mutations[0].generation, 1);
        assert!(route.fitness <= 1.0);
    }

    #[test]
    fn all_routes_sorted_fittest_first() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/fast");
        opt.register_route("/slow");
        for _ in 0..10 {
            opt.record_access("/fast", 10.0);
            opt.record_access("/slow", 4000.0);
        }
        opt.evolve_with_rng(&mut rng());

        let routes = opt.all_routes();
        assert_eq!(routes[0].path, "/fast");
        assert!(routes[0].fitness >= routes[1].fitness);
    }

    #[test]
    fn all_routes_read_is_idempotent() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/a");
        opt.register_route("/b");
        opt.evolve_with_rng(&mut rng());
        let first: Vec<_> = opt.all_routes().iter().map(|r| (r.path.clone(), r.fitness)).collect();
        let second: Vec<_> = opt.all_routes().iter().map(|r| (r.path.clone(), r.fitness)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn select_route_prefers_fitter_candidates() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/fit");
        opt.register_route("/unfit");
        for _ in 0..100 {
            opt.record_access("/fit", 10.0);
            opt.record_access("/unfit", 4900.0);
        }
        opt.evolve_with_rng(&mut rng());

        let mut r = rng();
        let picks = (0..200)
            .filter_map(|_| opt.select_route_with_rng(&["/fit", "/unfit"], &mut r))
            .filter(|p| p == "/fit")
            .count();
        assert!(picks > 120, "fit route picked only {picks}/200 times");
    }

    #[test]
    fn select_route_skips_unknown_candidates() {
        let opt = RouteFitnessOptimizer::new(no_mutation());
        opt.register_route("/known");
        let pick = opt.select_route_with_rng(&["/ghost", "/known"], &mut rng());
        assert_eq!(pick.as_deref(), Some("/known"));
        assert!(opt
            .select_route_with_rng(&["/ghost"], &mut rng())
            .is_none());
    }
}
