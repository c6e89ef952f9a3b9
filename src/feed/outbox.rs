use std::collections::BTreeMap;

use crate::{
    api::ApiError,
    post::{Post, PostDraft, PostId},
};

pub type Seq = u64;

/// A local change that still has to reach the server.
#[derive(Debug, Clone)]
pub enum Mutation {
    Create {
        local: String,
        draft: PostDraft,
    },
    Update {
        target: PostId,
        draft: PostDraft,
        previous: Post,
    },
    Delete {
        target: PostId,
        previous: Post,
        position: usize,
    },
}

#[derive(Debug)]
pub struct Outstanding {
    pub mutation: Mutation,
    pub attempts: u32,
    /// Waiting for the server id of a post created locally.
    pub deferred: bool,
}

/// Result of one remote attempt, reported back to the view.
#[derive(Debug)]
pub struct Settled {
    pub seq: Seq,
    /// Server id for creations, `None` otherwise.
    pub outcome: Result<Option<String>, ApiError>,
}

/// Outstanding mutations in issue order.
#[derive(Debug, Default)]
pub struct Outbox {
    next: Seq,
    ops: BTreeMap<Seq, Outstanding>,
}

impl Mutation {
    /// Existing post the request addresses. Creations have none.
    pub fn target(&self) -> Option<&PostId> {
        match self {
            Self::Create { .. } => None,
            Self::Update { target, .. } | Self::Delete { target, .. } => Some(target),
        }
    }

    fn retarget(&mut self, from: &PostId, to: &PostId) {
        match self {
            Self::Create { .. } => {}
            Self::Update {
                target, previous, ..
            }
            | Self::Delete {
                target, previous, ..
            } => {
                if target == from {
                    *target = to.clone();
                }
                if previous.id == *from {
                    previous.id = to.clone();
                }
            }
        }
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create { local, .. } => write!(f, "adding post {local}"),
            Self::Update { target, .. } => write!(f, "updating post {target}"),
            Self::Delete { target, .. } => write!(f, "deleting post {target}"),
        }
    }
}

impl Outbox {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records `mutation`. It starts deferred when it addresses a post whose
    /// creation has not been confirmed yet.
    pub fn push(&mut self, mutation: Mutation) -> Seq {
        let seq = self.next;
        self.next += 1;

        let deferred = mutation.target().is_some_and(PostId::is_pending);
        self.ops.insert(
            seq,
            Outstanding {
                mutation,
                attempts: 0,
                deferred,
            },
        );

        seq
    }

    pub fn get(&self, seq: Seq) -> Option<&Outstanding> {
        self.ops.get(&seq)
    }

    pub fn get_mut(&mut self, seq: Seq) -> Option<&mut Outstanding> {
        self.ops.get_mut(&seq)
    }

    pub fn take(&mut self, seq: Seq) -> Option<Outstanding> {
        self.ops.remove(&seq)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Operations that are currently being sent or retried.
    pub fn in_flight(&self) -> usize {
        self.ops.values().filter(|o| !o.deferred).count()
    }

    /// Whether the creation of the locally minted `local` is still outstanding.
    pub fn awaits_create(&self, local: &str) -> bool {
        self.ops
            .values()
            .any(|o| matches!(&o.mutation, Mutation::Create { local: l, .. } if l == local))
    }

    /// Points every deferred operation on `local` at `server` and releases
    /// them. Returns the released operations in issue order.
    pub fn confirm(&mut self, local: &str, server: &str) -> Vec<Seq> {
        let from = PostId::Pending(local.to_owned());
        let to = PostId::Confirmed(server.to_owned());

        let mut released = Vec::new();
        for (seq, op) in self.ops.iter_mut() {
            op.mutation.retarget(&from, &to);
            if op.deferred && op.mutation.target() == Some(&to) {
                op.deferred = false;
                released.push(*seq);
            }
        }

        released
    }

    /// Drops deferred operations waiting on `local`. Returns how many.
    pub fn abandon(&mut self, local: &str) -> usize {
        let id = PostId::Pending(local.to_owned());
        let before = self.ops.len();
        self.ops
            .retain(|_, op| !(op.deferred && op.mutation.target() == Some(&id)));

        before - self.ops.len()
    }
}
