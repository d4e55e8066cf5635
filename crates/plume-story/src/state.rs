//! Mutable story state: frames, variables, visits, choices and the RNG.

use std::collections::{HashMap, HashSet};

use plume_core::{Uuid, Value};
use plume_expr::{Scope, VariableStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::content::{Content, SequenceKind};
use crate::frame::Frame;
use crate::weave::KnotId;

/// Visit bookkeeping for one knot, stitch or gather.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitCount {
    /// Number of passes through the node.
    pub times_visited: u32,
    /// Completed turns since the last pass.
    pub turns_since_visited: i64,
}

/// Where the flow stands between host calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Content remains to be executed.
    Running,
    /// Choices are on offer and one must be chosen.
    AtChoice,
    /// The story is over.
    Ended,
}

/// A choice on offer, with everything needed to resume from it.
#[derive(Debug, Clone)]
pub(crate) struct PendingChoice {
    /// Shared plus choice-only text.
    pub text: String,
    /// Shared plus output-only text, printed on selection.
    pub echo: String,
    pub tags: Vec<String>,
    pub knot: KnotId,
    pub choice: Uuid,
    pub entry: usize,
    pub result: Content,
    pub immediately_continue: bool,
    pub fallback: bool,
    pub from_thread: bool,
    pub resume: Vec<(Frame, Scope)>,
}

#[derive(Debug, Clone, Default)]
struct SequenceCursor {
    visits: usize,
    unseen: Vec<usize>,
}

/// Everything that changes while a story runs.
#[derive(Debug)]
pub struct StoryState {
    pub(crate) frames: Vec<Frame>,
    pub(crate) variables: VariableStore,
    visits: HashMap<Uuid, VisitCount>,
    taken: HashMap<KnotId, HashMap<Uuid, HashSet<usize>>>,
    sequences: HashMap<Uuid, SequenceCursor>,
    pub(crate) choices: Vec<PendingChoice>,
    pub(crate) status: FlowStatus,
    turn_index: i64,
    rng: StdRng,
    /// Set when a function frame returns; the outer `Option` is whether
    /// it has returned at all.
    pub(crate) function_return: Option<Option<Value>>,
}

impl StoryState {
    /// Create an empty state whose RNG is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            frames: Vec::new(),
            variables: VariableStore::new(),
            visits: HashMap::new(),
            taken: HashMap::new(),
            sequences: HashMap::new(),
            choices: Vec::new(),
            status: FlowStatus::Running,
            turn_index: 0,
            rng: StdRng::seed_from_u64(seed),
            function_return: None,
        }
    }

    /// The variable store.
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Current flow status.
    pub fn status(&self) -> FlowStatus {
        self.status
    }

    /// Completed turns.
    pub fn turn_index(&self) -> i64 {
        self.turn_index
    }

    /// The active frames, outermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Record a pass through `uuid`.
    pub fn visit(&mut self, uuid: Uuid) {
        let count = self.visits.entry(uuid).or_default();
        count.times_visited += 1;
        count.turns_since_visited = 0;
    }

    /// Visit bookkeeping for `uuid`; zero if never visited.
    pub fn visit_count(&self, uuid: Uuid) -> VisitCount {
        self.visits.get(&uuid).copied().unwrap_or_default()
    }

    /// Passes through `uuid`.
    pub fn times_visited(&self, uuid: Uuid) -> u32 {
        self.visit_count(uuid).times_visited
    }

    /// Turns since `uuid` was visited, or -1 if it never was.
    pub fn turns_since(&self, uuid: Uuid) -> i64 {
        match self.visits.get(&uuid) {
            Some(count) if count.times_visited > 0 => count.turns_since_visited,
            _ => -1,
        }
    }

    /// Close the current turn.
    pub(crate) fn complete_turn(&mut self) {
        self.turn_index += 1;
        for count in self.visits.values_mut() {
            count.turns_since_visited += 1;
        }
    }

    /// Whether entry `entry` of choice `choice` in `knot` was chosen.
    pub fn is_taken(&self, knot: KnotId, choice: Uuid, entry: usize) -> bool {
        self.taken
            .get(&knot)
            .and_then(|choices| choices.get(&choice))
            .is_some_and(|entries| entries.contains(&entry))
    }

    pub(crate) fn mark_taken(&mut self, knot: KnotId, choice: Uuid, entry: usize) {
        self.taken
            .entry(knot)
            .or_default()
            .entry(choice)
            .or_default()
            .insert(entry);
    }

    /// Pick the group a sequence shows on this pass and advance its cursor.
    pub(crate) fn next_group(&mut self, id: Uuid, kind: SequenceKind, groups: usize) -> Option<usize> {
        if groups == 0 {
            return None;
        }
        let rng = &mut self.rng;
        let cursor = self.sequences.entry(id).or_default();
        let visit = cursor.visits;
        cursor.visits += 1;
        let last = groups - 1;

        match kind {
            SequenceKind::Sequence => Some(visit.min(last)),
            SequenceKind::Cycle => Some(visit % groups),
            SequenceKind::OnceOnly => (visit < groups).then_some(visit),
            SequenceKind::Shuffle => {
                if cursor.unseen.is_empty() {
                    cursor.unseen = (0..groups).collect();
                }
                draw(rng, &mut cursor.unseen)
            }
            SequenceKind::ShuffleOnce => {
                if visit >= groups {
                    return None;
                }
                if visit == 0 {
                    cursor.unseen = (0..groups).collect();
                }
                draw(rng, &mut cursor.unseen)
            }
            SequenceKind::ShuffleStop => {
                if visit >= last {
                    return Some(last);
                }
                if visit == 0 {
                    cursor.unseen = (0..last).collect();
                }
                draw(rng, &mut cursor.unseen)
            }
        }
    }

    /// Uniform integer in `min..=max`.
    pub(crate) fn random(&mut self, min: i64, max: i64) -> i64 {
        self.rng.random_range(min..=max)
    }

    /// Reseed the RNG.
    pub(crate) fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

fn draw(rng: &mut StdRng, unseen: &mut Vec<usize>) -> Option<usize> {
    if unseen.is_empty() {
        return None;
    }
    let index = rng.random_range(0..unseen.len());
    Some(unseen.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn picks(state: &mut StoryState, kind: SequenceKind, groups: usize, n: usize) -> Vec<Option<usize>> {
        (0..n).map(|_| state.next_group(Uuid(1), kind, groups)).collect()
    }

    #[test]
    fn cycle_wraps() {
        let mut state = StoryState::new(0);
        assert_eq!(
            picks(&mut state, SequenceKind::Cycle, 2, 4),
            vec![Some(0), Some(1), Some(0), Some(1)]
        );
    }

    #[test]
    fn once_only_runs_out() {
        let mut state = StoryState::new(0);
        assert_eq!(
            picks(&mut state, SequenceKind::OnceOnly, 2, 3),
            vec![Some(0), Some(1), None]
        );
    }

    #[test]
    fn sequence_sticks_on_last() {
        let mut state = StoryState::new(0);
        assert_eq!(
            picks(&mut state, SequenceKind::Sequence, 3, 5),
            vec![Some(0), Some(1), Some(2), Some(2), Some(2)]
        );
    }

    #[test]
    fn shuffle_shows_every_group_each_round() {
        let mut state = StoryState::new(3);
        let all = picks(&mut state, SequenceKind::Shuffle, 4, 8);
        let first: BTreeSet<_> = all[..4].iter().flatten().copied().collect();
        let second: BTreeSet<_> = all[4..].iter().flatten().copied().collect();
        assert_eq!(first, (0..4).collect());
        assert_eq!(second, (0..4).collect());
    }

    #[test]
    fn shuffle_once_and_stop() {
        let mut state = StoryState::new(5);
        let once = picks(&mut state, SequenceKind::ShuffleOnce, 3, 4);
        assert_eq!(once[3], None);
        let seen: BTreeSet<_> = once[..3].iter().flatten().copied().collect();
        assert_eq!(seen, (0..3).collect());

        let mut state = StoryState::new(5);
        let stop = picks(&mut state, SequenceKind::ShuffleStop, 3, 5);
        let early: BTreeSet<_> = stop[..2].iter().flatten().copied().collect();
        assert_eq!(early, (0..2).collect());
        assert_eq!(&stop[2..], &[Some(2), Some(2), Some(2)]);
    }

    #[test]
    fn visits_reset_turns_since() {
        let mut state = StoryState::new(0);
        let node = Uuid(4);
        assert_eq!(state.turns_since(node), -1);
        state.visit(node);
        state.complete_turn();
        state.complete_turn();
        assert_eq!(state.turns_since(node), 2);
        state.visit(node);
        assert_eq!(state.turns_since(node), 0);
        assert_eq!(state.times_visited(node), 2);
        assert_eq!(state.turn_index(), 2);
    }

    #[test]
    fn taken_choices_are_per_knot() {
        let mut state = StoryState::new(0);
        state.mark_taken(KnotId(0), Uuid(9), 1);
        assert!(state.is_taken(KnotId(0), Uuid(9), 1));
        assert!(!state.is_taken(KnotId(1), Uuid(9), 1));
        assert!(!state.is_taken(KnotId(0), Uuid(9), 0));
    }
}
