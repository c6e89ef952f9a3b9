use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::{
    api::PostService,
    config::{FailurePolicy, OrderPolicy, SyncConfig},
    post::{self, Post, PostDraft, PostId},
    session::Session,
    store::{self, LocalStore, POSTS_KEY},
};

use super::outbox::{Mutation, Outbox, Seq, Settled};

/// Outcome of mounting the feed.
pub enum Mount {
    Shown(FeedView),
    /// Nobody is signed in; the caller should send the user to sign in.
    Redirect,
}

/// Fields of the create/edit overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostForm {
    pub content: String,
    pub image: Option<String>,
}

/// Visible overlay and what submitting it will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Editor {
    Create(PostForm),
    Edit { target: PostId, form: PostForm },
}

/// The feed of one signed-in user.
///
/// Every mutation is applied to the in-memory list first, mirrored to the
/// local store in full, and then sent to the [`PostService`] from a spawned
/// task. Completed requests come back over a channel and are applied by
/// [`FeedView::poll`] or [`FeedView::sync`]; mutations must therefore be made
/// from within a tokio runtime.
pub struct FeedView {
    session: Session,
    posts: Vec<Post>,
    editor: Option<Editor>,

    store: Box<dyn LocalStore>,
    service: Arc<dyn PostService>,
    sync: SyncConfig,

    outbox: Outbox,
    tx: UnboundedSender<Settled>,
    rx: UnboundedReceiver<Settled>,
}

impl PostForm {
    fn from_post(post: &Post) -> Self {
        Self {
            content: post.content.clone(),
            image: post.image.clone(),
        }
    }
}

impl Editor {
    pub fn form(&self) -> &PostForm {
        match self {
            Self::Create(form) | Self::Edit { form, .. } => form,
        }
    }
}

impl FeedView {
    /// Mounts the feed for `session`, fetching the full collection once.
    /// A failed fetch leaves the feed empty.
    pub async fn mount(
        session: Option<Session>,
        service: Arc<dyn PostService>,
        store: Box<dyn LocalStore>,
        sync: SyncConfig,
    ) -> Mount {
        let Some(session) = session else {
            tracing::info!("no signed-in user, redirecting to sign-in");
            return Mount::Redirect;
        };

        let posts = match service.list().await {
            Ok(remote) => {
                let mut posts: Vec<Post> = remote.into_iter().map(Post::from).collect();
                post::sort_newest_first(&mut posts);
                tracing::debug!(count = posts.len(), "fetched posts");
                posts
            }
            Err(e) => {
                tracing::error!("error fetching posts: {e}");
                Vec::new()
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();

        Mount::Shown(Self {
            session,
            posts,
            editor: None,
            store,
            service,
            sync,
            outbox: Outbox::new(),
            tx,
            rx,
        })
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    pub fn editor(&self) -> Option<&Editor> {
        self.editor.as_ref()
    }

    pub fn is_overlay_open(&self) -> bool {
        self.editor.is_some()
    }

    /// Mutations not yet acknowledged by the server.
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Whether edit and delete are offered for `post`.
    pub fn can_modify(&self, post: &Post) -> bool {
        post.username == self.session.username()
    }

    /// Looks a post up by its id as printed, pending or confirmed.
    pub fn find(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id.as_str() == id)
    }

    pub fn begin_create(&mut self) {
        self.editor = Some(Editor::Create(PostForm::default()));
    }

    /// Opens the overlay on `post`. Nothing changes until [`FeedView::submit`].
    pub fn begin_edit(&mut self, post: &Post) {
        self.editor = Some(Editor::Edit {
            target: post.id.clone(),
            form: PostForm::from_post(post),
        });
    }

    pub fn form_mut(&mut self) -> Option<&mut PostForm> {
        match self.editor.as_mut()? {
            Editor::Create(form) | Editor::Edit { form, .. } => Some(form),
        }
    }

    pub fn close_overlay(&mut self) {
        self.editor = None;
    }

    /// Submits the overlay's form as the signed-in user, stamped now.
    pub fn submit(&mut self) -> Option<PostId> {
        let Some(editor) = self.editor.take() else {
            tracing::warn!("submit without an open editor");
            return None;
        };

        let (target, form) = match editor {
            Editor::Create(form) => (None, form),
            Editor::Edit { target, form } => (Some(target), form),
        };
        let draft = PostDraft::now(
            self.session.username(),
            form.content,
            form.image.filter(|i| !i.is_empty()),
        );

        self.submit_post(draft, target.as_ref())
    }

    /// Creates a post from `draft`, or replaces the post `target` with it.
    /// Returns the id of the affected post, `None` if `target` is unknown.
    /// The overlay is closed either way.
    pub fn submit_post(&mut self, draft: PostDraft, target: Option<&PostId>) -> Option<PostId> {
        self.editor = None;

        let Some(target) = target else {
            let id = PostId::Pending(self.provisional_id());
            self.posts
                .insert(0, Post::from_draft(id.clone(), draft.clone()));
            self.reorder();
            self.persist();
            self.enqueue(Mutation::Create {
                local: id.as_str().to_owned(),
                draft,
            });

            return Some(id);
        };

        let Some(position) = self.posts.iter().position(|p| p.id == *target) else {
            tracing::warn!("post {target} is not in the feed, nothing to update");
            return None;
        };

        let previous = std::mem::replace(
            &mut self.posts[position],
            Post::from_draft(target.clone(), draft.clone()),
        );
        self.reorder();
        self.persist();
        self.enqueue(Mutation::Update {
            target: target.clone(),
            draft,
            previous,
        });

        Some(target.clone())
    }

    /// Removes the post `id`. Returns `false`, changing nothing, if absent.
    pub fn delete_post(&mut self, id: &PostId) -> bool {
        let Some(position) = self.posts.iter().position(|p| p.id == *id) else {
            tracing::debug!("post {id} is not in the feed, nothing to delete");
            return false;
        };

        let previous = self.posts.remove(position);
        self.persist();
        self.enqueue(Mutation::Delete {
            target: id.clone(),
            previous,
            position,
        });

        true
    }

    /// Applies whatever requests have completed so far without waiting.
    pub fn poll(&mut self) {
        while let Ok(settled) = self.rx.try_recv() {
            self.settle(settled);
        }
    }

    /// Waits until every sendable mutation has succeeded or been rolled back.
    pub async fn sync(&mut self) {
        while !self.outbox.is_empty() && self.outbox.in_flight() > 0 {
            match self.rx.recv().await {
                Some(settled) => self.settle(settled),
                None => break,
            }
        }
    }

    fn provisional_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.find(&id).is_none() {
                return id;
            }
        }
    }

    fn reorder(&mut self) {
        if self.sync.order == OrderPolicy::Resort {
            post::sort_newest_first(&mut self.posts);
        }
    }

    fn persist(&mut self) {
        if let Err(e) = store::write_json(self.store.as_mut(), POSTS_KEY, &self.posts) {
            tracing::error!("failed to mirror posts to local store: {e}");
        }
    }

    fn enqueue(&mut self, mutation: Mutation) {
        if let Some(PostId::Pending(local)) = mutation.target() {
            if !self.outbox.awaits_create(local) {
                tracing::warn!("post {local} was never confirmed by the server, change stays local");
                return;
            }
        }

        let seq = self.outbox.push(mutation);
        if self.outbox.get(seq).is_some_and(|o| !o.deferred) {
            self.dispatch(seq, Duration::ZERO);
        }
    }

    fn dispatch(&mut self, seq: Seq, delay: Duration) {
        let Some(op) = self.outbox.get_mut(seq) else {
            return;
        };
        op.attempts += 1;

        let mutation = op.mutation.clone();
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let outcome = match &mutation {
                Mutation::Create { draft, .. } => service.create(draft).await,
                Mutation::Update { target, draft, .. } => service
                    .update(target.as_str(), draft)
                    .await
                    .map(|()| None),
                Mutation::Delete { target, .. } => {
                    service.delete(target.as_str()).await.map(|()| None)
                }
            };

            // the view is gone, nobody is left to care
            let _ = tx.send(Settled { seq, outcome });
        });
    }

    fn settle(&mut self, Settled { seq, outcome }: Settled) {
        let Some(op) = self.outbox.get(seq) else {
            return;
        };

        match outcome {
            Ok(server_id) => {
                tracing::debug!("done {}", op.mutation);
                if let Some(op) = self.outbox.take(seq) {
                    if let Mutation::Create { local, .. } = op.mutation {
                        self.confirm(&local, server_id);
                    }
                }
            }
            Err(e) if op.attempts < self.sync.max_attempts => {
                tracing::warn!(
                    "error {} (attempt {}/{}): {e}",
                    op.mutation,
                    op.attempts,
                    self.sync.max_attempts
                );
                self.dispatch(seq, self.sync.retry_delay());
            }
            Err(e) if self.sync.on_failure == FailurePolicy::RollBack => {
                tracing::error!("error {}, rolling back: {e}", op.mutation);
                if let Some(op) = self.outbox.take(seq) {
                    self.roll_back(op.mutation);
                }
            }
            Err(e) => {
                tracing::error!("error {}: {e}", op.mutation);
                if let Some(op) = self.outbox.take(seq) {
                    self.give_up(op.mutation);
                }
            }
        }
    }

    /// Leaves a failed change in place. A post whose creation failed never
    /// gets a server id, so changes queued on it cannot be sent either.
    fn give_up(&mut self, mutation: Mutation) {
        if let Mutation::Create { local, .. } = mutation {
            let dropped = self.outbox.abandon(&local);
            if dropped > 0 {
                tracing::warn!("dropped {dropped} queued change(s) to post {local}");
            }
        }
    }

    /// Swaps the provisional id of `local` for the one the server assigned.
    fn confirm(&mut self, local: &str, server_id: Option<String>) {
        let Some(server) = server_id else {
            tracing::warn!("server assigned no id to post {local}, it stays pending");
            let dropped = self.outbox.abandon(local);
            if dropped > 0 {
                tracing::warn!("dropped {dropped} queued change(s) to post {local}");
            }
            return;
        };

        let pending = PostId::Pending(local.to_owned());
        let confirmed = PostId::Confirmed(server.clone());

        for post in self.posts.iter_mut().filter(|p| p.id == pending) {
            post.id = confirmed.clone();
        }
        if let Some(Editor::Edit { target, .. }) = self.editor.as_mut() {
            if *target == pending {
                *target = confirmed.clone();
            }
        }
        self.persist();
        tracing::debug!("post {local} confirmed as {server}");

        for seq in self.outbox.confirm(local, &server) {
            self.dispatch(seq, Duration::ZERO);
        }
    }

    fn roll_back(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Create { local, .. } => {
                let pending = PostId::Pending(local.clone());
                self.posts.retain(|p| p.id != pending);
                self.outbox.abandon(&local);
            }
            Mutation::Update {
                target,
                draft,
                previous,
            } => {
                // a later edit wins over the restore
                if let Some(post) = self
                    .posts
                    .iter_mut()
                    .find(|p| p.id == target && p.holds(&draft))
                {
                    *post = previous;
                }
                self.reorder();
            }
            Mutation::Delete {
                target,
                previous,
                position,
            } => {
                if !self.posts.iter().any(|p| p.id == target) {
                    let position = position.min(self.posts.len());
                    self.posts.insert(position, previous);
                    self.reorder();
                }
            }
        }

        self.persist();
    }
}
