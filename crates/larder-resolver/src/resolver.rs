//! Depth-first resolution with chronological backtracking.
//!
//! The search keeps one decision frame per chosen name. Each frame owns the
//! candidates still untried for its name and remembers which constraint
//! edges its current choice introduced, so undoing a choice is a matter of
//! popping those edges. Names are decided in discovery order, which keeps
//! the result a pure function of the requirements and the provider state.

use crate::graph::ResolutionGraph;
use crate::provider::{Candidate, DependencyProvider};
use ahash::{AHashMap, AHashSet};
use larder_core::{
    CachedPackage, Constraint, ConstraintSource, Error, Requirement, Requirer, Result, Version,
    validate_requirements,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Default bound on backtracking steps.
pub const DEFAULT_MAX_BACKTRACKS: usize = 10_000;

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Backtracking steps allowed before giving up with `NoSolution`.
    pub max_backtracks: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_backtracks: DEFAULT_MAX_BACKTRACKS,
        }
    }
}

/// Dependency resolver over a [`DependencyProvider`].
#[derive(Debug)]
pub struct Resolver<P> {
    provider: Arc<P>,
    config: ResolverConfig,
    preferred: AHashMap<String, Version>,
}

impl<P: DependencyProvider> Resolver<P> {
    /// Create a resolver.
    pub fn new(provider: Arc<P>, config: ResolverConfig) -> Self {
        Self {
            provider,
            config,
            preferred: AHashMap::new(),
        }
    }

    /// Versions to try first for the given names, when still viable.
    #[must_use]
    pub fn with_preferred(mut self, preferred: impl IntoIterator<Item = (String, Version)>) -> Self {
        self.preferred.extend(preferred);
        self
    }

    /// The underlying provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Assign one version to every name reachable from `requirements`.
    ///
    /// # Errors
    ///
    /// `AmbiguousLocation` or `DuplicateRequirement` before any search,
    /// `NoSolution` when the constraints cannot all hold, and whatever the
    /// provider reports while listing or fetching.
    pub async fn resolve(&self, requirements: &[Requirement]) -> Result<ResolutionGraph> {
        validate_requirements(requirements)?;
        let start = Instant::now();
        let mut search = Search::new(requirements);
        let mut cache: AHashMap<String, Vec<Candidate>> = AHashMap::new();

        while let Some(name) = search.next_open() {
            let requirement = search.requirement_for(&name);
            if !cache.contains_key(&name) {
                let listed = self.provider.candidates(&requirement).await?;
                trace!(name = %name, count = listed.len(), "listed candidates");
                cache.insert(name.clone(), listed);
            }
            let offered = cache.get(&name).map_or(&[][..], Vec::as_slice);
            let candidates = search.viable(&name, offered, self.preferred.get(&name));
            debug!(name = %name, viable = candidates.len(), depth = search.stack.len(), "deciding");
            search.stack.push(Frame::new(name, candidates));

            while !self.advance(&mut search).await? {
                search.backtrack(self.config.max_backtracks)?;
            }
        }

        let backtracks = search.backtracks;
        let graph = ResolutionGraph::from_packages(search.into_packages());
        info!(
            packages = graph.len(),
            backtracks,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "resolution complete"
        );
        Ok(graph)
    }

    /// Undo the top frame's choice and commit its next workable candidate.
    ///
    /// Returns `false` once the frame has no candidates left.
    async fn advance(&self, search: &mut Search) -> Result<bool> {
        let Some(depth) = search.stack.len().checked_sub(1) else {
            return Ok(false);
        };
        search.undo_top();
        let name = search.stack[depth].name.clone();
        let requirement = search.requirement_for(&name);

        while let Some(candidate) = search.stack[depth].next_candidate() {
            trace!(name = %name, version = %candidate.version, "trying candidate");
            let package = self
                .provider
                .fetch_metadata(&requirement, &candidate)
                .await?;
            let required_by = Requirer::Package {
                name: name.clone(),
                version: package.version.clone(),
            };
            let dependencies: Vec<&Requirement> = package
                .dependencies
                .iter()
                .filter(|d| d.name != name && !search.pinned.contains(&d.name))
                .collect();

            let clash = dependencies.iter().find_map(|d| {
                search
                    .violation(&d.name, &d.constraint)
                    .map(|trace| (d, trace))
            });
            if let Some((dependency, mut trace)) = clash {
                debug!(
                    name = %name,
                    version = %package.version,
                    dependency = %dependency.name,
                    "candidate conflicts with an earlier decision"
                );
                trace.push(ConstraintSource {
                    name: dependency.name.clone(),
                    constraint: dependency.constraint.clone(),
                    required_by,
                });
                search.stack[depth].absorb(trace);
                continue;
            }

            let added: Vec<String> = dependencies
                .iter()
                .map(|d| {
                    search.add_edge(ConstraintSource {
                        name: d.name.clone(),
                        constraint: d.constraint.clone(),
                        required_by: required_by.clone(),
                    });
                    d.name.clone()
                })
                .collect();
            search.decided.insert(name.clone(), depth);
            let frame = &mut search.stack[depth];
            frame.added = added;
            frame.chosen = Some(package);
            return Ok(true);
        }
        Ok(false)
    }
}

/// One decision point.
#[derive(Debug)]
struct Frame {
    name: String,
    candidates: Vec<Candidate>,
    next: usize,
    chosen: Option<CachedPackage>,
    added: Vec<String>,
    /// Constraints that ruled out the candidates tried so far.
    conflicts: Vec<ConstraintSource>,
}

impl Frame {
    fn new(name: String, candidates: Vec<Candidate>) -> Self {
        Self {
            name,
            candidates,
            next: 0,
            chosen: None,
            added: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    fn absorb(&mut self, trace: impl IntoIterator<Item = ConstraintSource>) {
        for source in trace {
            if !self.conflicts.contains(&source) {
                self.conflicts.push(source);
            }
        }
    }

    fn next_candidate(&mut self) -> Option<Candidate> {
        let candidate = self.candidates.get(self.next).cloned();
        self.next += 1;
        candidate
    }
}

/// Mutable search state for a single resolution.
#[derive(Debug, Default)]
struct Search {
    requirements: AHashMap<String, Requirement>,
    edges: AHashMap<String, Vec<ConstraintSource>>,
    order: Vec<String>,
    pinned: AHashSet<String>,
    decided: AHashMap<String, usize>,
    stack: Vec<Frame>,
    backtracks: usize,
}

impl Search {
    /// Seed the search from the top-level requirements.
    ///
    /// A name registered more than once (in disjoint groups) resolves with
    /// its first registration only.
    fn new(requirements: &[Requirement]) -> Self {
        let mut search = Self::default();
        for requirement in requirements {
            if search.requirements.contains_key(&requirement.name) {
                trace!(name = %requirement.name, "ignoring later registration");
                continue;
            }
            search
                .requirements
                .insert(requirement.name.clone(), requirement.clone());
            if requirement.is_pinned() {
                search.pinned.insert(requirement.name.clone());
            }
            search.add_edge(ConstraintSource {
                name: requirement.name.clone(),
                constraint: requirement.constraint.clone(),
                required_by: Requirer::Manifest,
            });
        }
        search
    }

    /// First discovered name that still has constraints but no decision.
    fn next_open(&self) -> Option<String> {
        self.order
            .iter()
            .find(|name| {
                !self.decided.contains_key(*name)
                    && self.edges.get(*name).is_some_and(|e| !e.is_empty())
            })
            .cloned()
    }

    /// Top-level requirement for `name`, or an unconstrained one for names
    /// only reached transitively.
    fn requirement_for(&self, name: &str) -> Requirement {
        self.requirements
            .get(name)
            .cloned()
            .unwrap_or_else(|| Requirement::new(name, Constraint::any()))
    }

    fn add_edge(&mut self, source: ConstraintSource) {
        let edges = self.edges.entry(source.name.clone()).or_default();
        if edges.is_empty() && !self.order.contains(&source.name) {
            self.order.push(source.name.clone());
        }
        edges.push(source);
    }

    /// Candidates satisfying every edge on `name`, deduplicated by version,
    /// with the preferred version moved to the front.
    fn viable(
        &self,
        name: &str,
        offered: &[Candidate],
        preferred: Option<&Version>,
    ) -> Vec<Candidate> {
        let edges = self.edges.get(name).map_or(&[][..], Vec::as_slice);
        let mut seen = AHashSet::new();
        let mut viable: Vec<Candidate> = offered
            .iter()
            .filter(|c| edges.iter().all(|e| e.constraint.satisfies(&c.version)))
            .filter(|c| seen.insert(c.version.clone()))
            .cloned()
            .collect();
        if let Some(preferred) = preferred {
            if let Some(pos) = viable.iter().position(|c| &c.version == preferred) {
                let candidate = viable.remove(pos);
                viable.insert(0, candidate);
            }
        }
        viable
    }

    /// Constraint trace if a new edge would exclude an already chosen version.
    fn violation(&self, name: &str, constraint: &Constraint) -> Option<Vec<ConstraintSource>> {
        let depth = *self.decided.get(name)?;
        let chosen = self.stack[depth].chosen.as_ref()?;
        if constraint.satisfies(&chosen.version) {
            return None;
        }
        Some(self.edges.get(name).cloned().unwrap_or_default())
    }

    /// Withdraw the top frame's current choice and the edges it introduced.
    fn undo_top(&mut self) {
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        for name in frame.added.drain(..).rev() {
            if let Some(edges) = self.edges.get_mut(&name) {
                edges.pop();
            }
        }
        if frame.chosen.take().is_some() {
            self.decided.remove(&frame.name);
        }
    }

    /// Drop the exhausted top frame, failing once nothing is left to retry.
    ///
    /// Everything that ruled out the frame's candidates is handed to the
    /// choice it depended on, so the final error carries every branch.
    fn backtrack(&mut self, max_backtracks: usize) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(Error::NoSolution {
                name: String::new(),
                trace: Vec::new(),
            });
        };
        let mut trace: Vec<ConstraintSource> =
            self.edges.get(&frame.name).cloned().unwrap_or_default();
        for source in frame.conflicts {
            if !trace.contains(&source) {
                trace.push(source);
            }
        }
        self.backtracks += 1;
        if self.backtracks > max_backtracks {
            debug!(backtracks = self.backtracks, "backtracking limit reached");
        }
        match self.stack.last_mut() {
            Some(parent) if self.backtracks <= max_backtracks => {
                parent.absorb(trace);
                Ok(())
            }
            _ => Err(Error::NoSolution {
                name: frame.name,
                trace,
            }),
        }
    }

    fn into_packages(self) -> impl Iterator<Item = CachedPackage> {
        self.stack.into_iter().filter_map(|frame| frame.chosen)
    }
}
