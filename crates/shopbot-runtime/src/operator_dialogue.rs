//! Per-operator dialogue state machine.
//!
//! Transitions are pure: [`advance`] takes the current state, one input, and
//! a read-only view of the store, and returns the next state plus an effect
//! for the console to carry out. Nothing here is persisted.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use shopbot_promo::PreviewLimitAction;
use shopbot_store::{Aggregate, DiscountDescriptor, DiscountKind, PackageKey};

const CALLBACK_PREFIX: &str = "dlg:";
pub const PERCENT_RANGE: (u32, u32) = (1, 100);
pub const EURO_RANGE: (u32, u32) = (1, 999);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountTarget {
    /// Every known, non-banned customer.
    AllUsers,
    User(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChoice {
    AllUsers,
    SingleUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueFlow {
    CreateDiscount,
    Ban,
    Unban,
    PreviewLimit,
    DeleteDiscount,
}

impl DialogueFlow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateDiscount => "discount",
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::PreviewLimit => "preview",
            Self::DeleteDiscount => "delete_discount",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        [
            Self::CreateDiscount,
            Self::Ban,
            Self::Unban,
            Self::PreviewLimit,
            Self::DeleteDiscount,
        ]
        .into_iter()
        .find(|flow| flow.as_str() == raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DialogueState {
    #[default]
    Idle,
    ChooseDiscountType,
    ChooseTarget {
        kind: DiscountKind,
    },
    AwaitDiscountUserId {
        kind: DiscountKind,
    },
    AwaitValue {
        kind: DiscountKind,
        target: DiscountTarget,
    },
    ChoosePackages {
        kind: DiscountKind,
        target: DiscountTarget,
        value: u32,
        selected: BTreeSet<PackageKey>,
    },
    Finalize {
        target: DiscountTarget,
        descriptor: DiscountDescriptor,
    },
    AwaitBanUserId {
        banned: bool,
    },
    AwaitPreviewUserId,
    ChoosePreviewAction {
        user_id: String,
    },
    AwaitDeleteDiscountUserId,
    ConfirmDeleteDiscount {
        user_id: String,
    },
}

impl DialogueState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether free text is the expected input.
    pub fn expects_text(&self) -> bool {
        matches!(
            self,
            Self::AwaitDiscountUserId { .. }
                | Self::AwaitValue { .. }
                | Self::AwaitBanUserId { .. }
                | Self::AwaitPreviewUserId
                | Self::AwaitDeleteDiscountUserId
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueInput {
    Begin(DialogueFlow),
    ChooseKind(DiscountKind),
    ChooseTarget(TargetChoice),
    TogglePackage(PackageKey),
    PackagesDone,
    PreviewAction(PreviewLimitAction),
    Confirm,
    Abort,
    Text(String),
}

impl DialogueInput {
    /// Parses `dlg:*` button payloads.
    pub fn from_callback(data: &str) -> Option<Self> {
        let rest = data.strip_prefix(CALLBACK_PREFIX)?;
        let (verb, arg) = rest.split_once(':').unwrap_or((rest, ""));
        match (verb, arg) {
            ("begin", flow) => DialogueFlow::parse(flow).map(Self::Begin),
            ("kind", kind) => DiscountKind::parse(kind).map(Self::ChooseKind),
            ("target", "all") => Some(Self::ChooseTarget(TargetChoice::AllUsers)),
            ("target", "user") => Some(Self::ChooseTarget(TargetChoice::SingleUser)),
            ("pkg", key) => key.parse::<PackageKey>().ok().map(Self::TogglePackage),
            ("pkg_done", "") => Some(Self::PackagesDone),
            ("preview", action) => PreviewLimitAction::parse(action).map(Self::PreviewAction),
            ("confirm", "") => Some(Self::Confirm),
            ("abort", "") => Some(Self::Abort),
            _ => None,
        }
    }

    /// Button payload for this input. Free text has none.
    pub fn callback_data(&self) -> Option<String> {
        let suffix = match self {
            Self::Begin(flow) => format!("begin:{}", flow.as_str()),
            Self::ChooseKind(kind) => format!("kind:{}", kind.as_str()),
            Self::ChooseTarget(TargetChoice::AllUsers) => "target:all".to_string(),
            Self::ChooseTarget(TargetChoice::SingleUser) => "target:user".to_string(),
            Self::TogglePackage(key) => format!("pkg:{key}"),
            Self::PackagesDone => "pkg_done".to_string(),
            Self::PreviewAction(action) => format!("preview:{}", action.as_str()),
            Self::Confirm => "confirm".to_string(),
            Self::Abort => "abort".to_string(),
            Self::Text(_) => return None,
        };
        Some(format!("{CALLBACK_PREFIX}{suffix}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputProblem {
    NotNumeric,
    OutOfRange { min: u32, max: u32 },
    UnknownUser(String),
    NoDiscount(String),
    NoPackagesSelected,
    ExpectedButton,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueCommit {
    AssignDiscount {
        target: DiscountTarget,
        descriptor: DiscountDescriptor,
    },
    SetBanned {
        user_id: String,
        banned: bool,
    },
    AdjustPreviewLimit {
        user_id: String,
        action: PreviewLimitAction,
    },
    DeleteDiscount {
        user_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueEffect {
    /// Show the prompt of the next state.
    Prompt,
    /// Input rejected; the state is unchanged and its prompt is shown again.
    Reprompt(InputProblem),
    Commit(DialogueCommit),
    Aborted,
    /// Input does not apply to the current state (stale button).
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: DialogueState,
    pub effect: DialogueEffect,
}

impl Transition {
    fn prompt(next: DialogueState) -> Self {
        Self {
            next,
            effect: DialogueEffect::Prompt,
        }
    }

    fn reprompt(current: &DialogueState, problem: InputProblem) -> Self {
        Self {
            next: current.clone(),
            effect: DialogueEffect::Reprompt(problem),
        }
    }

    fn commit(commit: DialogueCommit) -> Self {
        Self {
            next: DialogueState::Idle,
            effect: DialogueEffect::Commit(commit),
        }
    }

    fn ignored(current: &DialogueState) -> Self {
        Self {
            next: current.clone(),
            effect: DialogueEffect::Ignored,
        }
    }
}

fn parse_digits(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit())).then_some(trimmed)
}

fn value_range(kind: DiscountKind) -> (u32, u32) {
    match kind {
        DiscountKind::Euro => EURO_RANGE,
        DiscountKind::Percent | DiscountKind::PercentPackages => PERCENT_RANGE,
    }
}

fn known_user(text: &str, aggregate: &Aggregate) -> Result<String, InputProblem> {
    let id = parse_digits(text).ok_or(InputProblem::NotNumeric)?;
    if aggregate.users.contains_key(id) {
        Ok(id.to_string())
    } else {
        Err(InputProblem::UnknownUser(id.to_string()))
    }
}

fn build_descriptor(
    kind: DiscountKind,
    value: u32,
    selected: &BTreeSet<PackageKey>,
) -> DiscountDescriptor {
    let packages = selected
        .iter()
        .map(|key| (*key, value))
        .collect::<BTreeMap<_, _>>();
    match kind {
        DiscountKind::Percent => DiscountDescriptor::Percent { value },
        DiscountKind::Euro => DiscountDescriptor::Euro { packages },
        DiscountKind::PercentPackages => DiscountDescriptor::PercentPackages { packages },
    }
}

fn begin(flow: DialogueFlow) -> DialogueState {
    match flow {
        DialogueFlow::CreateDiscount => DialogueState::ChooseDiscountType,
        DialogueFlow::Ban => DialogueState::AwaitBanUserId { banned: true },
        DialogueFlow::Unban => DialogueState::AwaitBanUserId { banned: false },
        DialogueFlow::PreviewLimit => DialogueState::AwaitPreviewUserId,
        DialogueFlow::DeleteDiscount => DialogueState::AwaitDeleteDiscountUserId,
    }
}

fn text_input(state: &DialogueState, text: &str, aggregate: &Aggregate) -> Transition {
    let user = || known_user(text, aggregate);
    match state {
        DialogueState::AwaitDiscountUserId { kind } => match user() {
            Ok(user_id) => Transition::prompt(DialogueState::AwaitValue {
                kind: *kind,
                target: DiscountTarget::User(user_id),
            }),
            Err(problem) => Transition::reprompt(state, problem),
        },
        DialogueState::AwaitValue { kind, target } => {
            let (min, max) = value_range(*kind);
            let Some(value) = parse_digits(text).and_then(|digits| digits.parse::<u32>().ok())
            else {
                return Transition::reprompt(state, InputProblem::NotNumeric);
            };
            if !(min..=max).contains(&value) {
                return Transition::reprompt(state, InputProblem::OutOfRange { min, max });
            }
            if kind.requires_packages() {
                Transition::prompt(DialogueState::ChoosePackages {
                    kind: *kind,
                    target: target.clone(),
                    value,
                    selected: BTreeSet::new(),
                })
            } else {
                Transition::prompt(DialogueState::Finalize {
                    target: target.clone(),
                    descriptor: build_descriptor(*kind, value, &BTreeSet::new()),
                })
            }
        }
        DialogueState::AwaitBanUserId { banned } => match user() {
            Ok(user_id) => Transition::commit(DialogueCommit::SetBanned {
                user_id,
                banned: *banned,
            }),
            Err(problem) => Transition::reprompt(state, problem),
        },
        DialogueState::AwaitPreviewUserId => match user() {
            Ok(user_id) => Transition::prompt(DialogueState::ChoosePreviewAction { user_id }),
            Err(problem) => Transition::reprompt(state, problem),
        },
        DialogueState::AwaitDeleteDiscountUserId => match user() {
            Ok(user_id) => {
                let has_discount = aggregate
                    .users
                    .get(&user_id)
                    .map(|record| record.discount.is_some())
                    .unwrap_or(false);
                if has_discount {
                    Transition::prompt(DialogueState::ConfirmDeleteDiscount { user_id })
                } else {
                    Transition::reprompt(state, InputProblem::NoDiscount(user_id))
                }
            }
            Err(problem) => Transition::reprompt(state, problem),
        },
        DialogueState::Idle => Transition::ignored(state),
        _ => Transition::reprompt(state, InputProblem::ExpectedButton),
    }
}

/// Computes the transition for one operator input.
pub fn advance(state: &DialogueState, input: DialogueInput, aggregate: &Aggregate) -> Transition {
    match (state, input) {
        (_, DialogueInput::Abort) => Transition {
            next: DialogueState::Idle,
            effect: if state.is_idle() {
                DialogueEffect::Ignored
            } else {
                DialogueEffect::Aborted
            },
        },
        (_, DialogueInput::Begin(flow)) => Transition::prompt(begin(flow)),
        (_, DialogueInput::Text(text)) => text_input(state, &text, aggregate),
        (DialogueState::ChooseDiscountType, DialogueInput::ChooseKind(kind)) => {
            Transition::prompt(DialogueState::ChooseTarget { kind })
        }
        (DialogueState::ChooseTarget { kind }, DialogueInput::ChooseTarget(choice)) => {
            Transition::prompt(match choice {
                TargetChoice::AllUsers => DialogueState::AwaitValue {
                    kind: *kind,
                    target: DiscountTarget::AllUsers,
                },
                TargetChoice::SingleUser => DialogueState::AwaitDiscountUserId { kind: *kind },
            })
        }
        (
            DialogueState::ChoosePackages {
                kind,
                target,
                value,
                selected,
            },
            DialogueInput::TogglePackage(key),
        ) => {
            let mut selected = selected.clone();
            if !selected.remove(&key) {
                selected.insert(key);
            }
            Transition::prompt(DialogueState::ChoosePackages {
                kind: *kind,
                target: target.clone(),
                value: *value,
                selected,
            })
        }
        (
            DialogueState::ChoosePackages {
                kind,
                target,
                value,
                selected,
            },
            DialogueInput::PackagesDone,
        ) => {
            if selected.is_empty() {
                return Transition::reprompt(state, InputProblem::NoPackagesSelected);
            }
            Transition::prompt(DialogueState::Finalize {
                target: target.clone(),
                descriptor: build_descriptor(*kind, *value, selected),
            })
        }
        (DialogueState::Finalize { target, descriptor }, DialogueInput::Confirm) => {
            Transition::commit(DialogueCommit::AssignDiscount {
                target: target.clone(),
                descriptor: descriptor.clone(),
            })
        }
        (DialogueState::ChoosePreviewAction { user_id }, DialogueInput::PreviewAction(action)) => {
            Transition::commit(DialogueCommit::AdjustPreviewLimit {
                user_id: user_id.clone(),
                action,
            })
        }
        (DialogueState::ConfirmDeleteDiscount { user_id }, DialogueInput::Confirm) => {
            Transition::commit(DialogueCommit::DeleteDiscount {
                user_id: user_id.clone(),
            })
        }
        _ => Transition::ignored(state),
    }
}

#[derive(Debug, Default)]
/// Dialogue state per operator id. Idle operators have no entry.
pub struct OperatorDialogues {
    states: HashMap<i64, DialogueState>,
}

impl OperatorDialogues {
    pub fn state(&self, operator_id: i64) -> DialogueState {
        self.states
            .get(&operator_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set(&mut self, operator_id: i64, state: DialogueState) {
        if state.is_idle() {
            self.states.remove(&operator_id);
        } else {
            self.states.insert(operator_id, state);
        }
    }

    pub fn is_active(&self, operator_id: i64) -> bool {
        self.states.contains_key(&operator_id)
    }
}
