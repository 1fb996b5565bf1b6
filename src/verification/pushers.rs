use crate::jvm::code::{MethodBody, StackEffect};
use std::collections::{HashSet, VecDeque};

/// A stack provenance query gave up
///
/// This happens when the backward walk reaches the entry of an exception handler (whose stack is
/// not tracked) or visits too many states. Callers must not assume anything about the value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TooComplex;

/// Instructions that may have pushed a given stack slot
///
/// The walk goes backwards from an instruction, breadth first, over states made of an
/// instruction and the number of stack slots that still have to be popped off (going backwards)
/// to reach the slot of interest. A predecessor producing at least that many slots is a pusher;
/// otherwise the walk continues from the predecessor, with its consumed slots added back in.
///
/// Results are produced lazily, each at most once. After a [`TooComplex`] the iterator is done.
pub struct Pushers<'a> {
    body: &'a MethodBody,
    effects: &'a [StackEffect],
    max_states: usize,
    worklist: VecDeque<(usize, usize)>,
    seen: HashSet<(usize, usize)>,
    found: HashSet<usize>,
    pending: VecDeque<usize>,
    finished: bool,
}

impl<'a> Pushers<'a> {
    /// Pushers of the value `stack_offset` slots below the top of the stack, right before
    /// `instruction` executes (`0` is the top of the stack)
    ///
    /// `effects` holds the stack effect of each instruction of `body`.
    pub fn new(
        body: &'a MethodBody,
        effects: &'a [StackEffect],
        instruction: usize,
        stack_offset: usize,
        max_states: usize,
    ) -> Pushers<'a> {
        let start = (instruction, stack_offset + 1);
        let mut seen = HashSet::new();
        seen.insert(start);
        Pushers {
            body,
            effects,
            max_states,
            worklist: VecDeque::from(vec![start]),
            seen,
            found: HashSet::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn step(&mut self, current: usize, residual: usize) -> Result<(), TooComplex> {
        if self.body.is_handler_entry(current) {
            return Err(TooComplex);
        }

        log::trace!("pushers state at {} needing {} slots", current, residual);
        for &predecessor in self.body.predecessors(current) {
            let effect = self.effects[predecessor];
            if residual <= effect.produced {
                if self.found.insert(predecessor) {
                    self.pending.push_back(predecessor);
                }
            } else {
                let state = (predecessor, residual - effect.produced + effect.consumed);
                if self.seen.insert(state) {
                    if self.seen.len() > self.max_states {
                        return Err(TooComplex);
                    }
                    self.worklist.push_back(state);
                }
            }
        }
        Ok(())
    }
}

impl<'a> Iterator for Pushers<'a> {
    type Item = Result<usize, TooComplex>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pusher) = self.pending.pop_front() {
                return Some(Ok(pusher));
            }
            if self.finished {
                return None;
            }

            let (current, residual) = match self.worklist.pop_front() {
                Some(state) => state,
                None => {
                    self.finished = true;
                    return None;
                }
            };
            if let Err(too_complex) = self.step(current, residual) {
                log::warn!(
                    "stack provenance query gave up at instruction {} after {} states",
                    current,
                    self.seen.len()
                );
                self.finished = true;
                self.pending.clear();
                return Some(Err(too_complex));
            }
        }
    }
}
