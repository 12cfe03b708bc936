//! [`CallStack`] – explicit continuation stack of one agent.
//!
//! Module calls nest by pushing frames instead of recursing, so a round can
//! stop at any point and resume in the next round from the same place.
//!
//! | Frame | Continuation |
//! |---|---|
//! | [`ModuleFrame`] | the rule to try next in the current pass |
//! | [`ActionFrame`] | the next action of a rule's action combo |

use std::sync::Arc;

use cogent_types::{SourceInfo, Substitution, Update};

use crate::program::{Action, Module, ModuleKind};

/// Progress through one pass over a module's rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pass {
    pub next_rule: usize,
    pub fired: bool,
}

#[derive(Debug, Clone)]
pub struct ModuleFrame {
    pub module: Arc<Module>,
    /// Bindings the module's rules start from.
    pub seed: Substitution,
    /// Goal to put in focus on entry (filter and select focus).
    pub focus_goal: Option<Update>,
    pub entered: bool,
    /// `true` when entry pushed an attention set that exit must pop.
    pub focused: bool,
    pub pass: Option<Pass>,
}

impl ModuleFrame {
    pub fn new(module: Arc<Module>, seed: Substitution, focus_goal: Option<Update>) -> Self {
        Self {
            module,
            seed,
            focus_goal,
            entered: false,
            focused: false,
            pass: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionFrame {
    pub actions: Arc<[Action]>,
    pub subst: Substitution,
    pub next: usize,
    pub focus_goal: Option<Update>,
    pub source: Option<SourceInfo>,
}

impl ActionFrame {
    pub fn new(actions: Arc<[Action]>, subst: Substitution, focus_goal: Option<Update>, source: Option<SourceInfo>) -> Self {
        Self {
            actions,
            subst,
            next: 0,
            focus_goal,
            source,
        }
    }

    /// The next action, instantiated, advancing the frame past it.
    pub fn advance(&mut self) -> Option<Action> {
        let action = self.actions.get(self.next)?.apply_subst(&self.subst);
        self.next += 1;
        Some(action)
    }
}

#[derive(Debug, Clone)]
pub enum Frame {
    Module(ModuleFrame),
    Actions(ActionFrame),
}

#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn push_module(&mut self, module: Arc<Module>, seed: Substitution, focus_goal: Option<Update>) {
        self.push(Frame::Module(ModuleFrame::new(module, seed, focus_goal)));
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of module frames, the innermost module's nesting level.
    pub fn module_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| matches!(f, Frame::Module(_)))
            .count()
    }

    /// Kinds of the module frames, outermost first.
    pub fn module_kinds(&self) -> Vec<ModuleKind> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Module(m) => Some(m.module.kind),
                Frame::Actions(_) => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogent_kr::parse_update;
    use cogent_types::Term;

    #[test]
    fn action_frame_instantiates_in_order() {
        let actions: Arc<[Action]> = Arc::from(vec![
            Action::insert(parse_update("p(X)").unwrap()),
            Action::Print(Term::var("X")),
        ]);
        let mut frame = ActionFrame::new(actions, Substitution::singleton("X", Term::int(1)), None, None);
        assert_eq!(frame.advance().unwrap().to_string(), "self.insert(p(1))");
        assert_eq!(frame.advance().unwrap().to_string(), "print(1)");
        assert!(frame.advance().is_none());
    }

    #[test]
    fn depth_counts_frames_and_modules() {
        let mut stack = CallStack::new();
        stack.push_module(Arc::new(Module::main()), Substitution::new(), None);
        stack.push(Frame::Actions(ActionFrame::new(Arc::from(Vec::<Action>::new()), Substitution::new(), None, None)));
        stack.push_module(Arc::new(Module::user("sub")), Substitution::new(), None);
        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.module_depth(), 2);
        assert_eq!(stack.module_kinds(), vec![ModuleKind::Main, ModuleKind::User]);
        stack.clear();
        assert!(stack.is_empty());
    }
}
