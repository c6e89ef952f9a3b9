use std::fmt::{Display, Write};

use chrono::{
    format::{Item, StrftimeItems},
    Local,
};

use crate::post::Post;

use super::view::FeedView;

const AVATAR_URL: &str = "https://i.pravatar.cc/150?u=";

/// Terminal rendering of a [`FeedView`].
pub struct FeedRender<'a> {
    view: &'a FeedView,
    time_format: &'a str,
}

impl FeedView {
    /// Renders the feed with timestamps in local time using `time_format`.
    pub fn render<'a>(&'a self, time_format: &'a str) -> FeedRender<'a> {
        FeedRender {
            view: self,
            time_format,
        }
    }
}

impl FeedRender<'_> {
    fn timestamp(&self, post: &Post) -> String {
        let valid_format = !StrftimeItems::new(self.time_format).any(|i| matches!(i, Item::Error));

        match post.instant() {
            Some(t) if valid_format => t.with_timezone(&Local).format(self.time_format).to_string(),
            _ => post.timestamp.clone(),
        }
    }

    fn post(&self, f: &mut std::fmt::Formatter<'_>, post: &Post) -> std::fmt::Result {
        write!(f, "@{}  {}  #{}", post.username, self.timestamp(post), post.id)?;
        if post.id.is_pending() {
            f.write_str(" (pending)")?;
        }
        if self.view.can_modify(post) {
            f.write_str("  [edit] [delete]")?;
        }
        f.write_char('\n')?;

        writeln!(f, "  avatar {AVATAR_URL}{}", post.username)?;
        for line in post.content.lines() {
            writeln!(f, "  {line}")?;
        }
        if let Some(image) = &post.image {
            writeln!(f, "  image {image}")?;
        }
        // decoration only, there is no like/comment model behind it
        writeln!(f, "  Like  Comment  Share    10 Likes • 5 Comments")
    }
}

impl Display for FeedRender<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let posts = self.view.posts();
        writeln!(
            f,
            "signed in as {} · {} post(s)",
            self.view.session().username(),
            posts.len()
        )?;

        if posts.is_empty() {
            return writeln!(f, "\nno posts yet");
        }

        for post in posts {
            f.write_char('\n')?;
            self.post(f, post)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::{future::BoxFuture, FutureExt};

    use super::*;
    use crate::{
        api::{ApiError, PostService},
        config::SyncConfig,
        feed::Mount,
        post::{PostDraft, RemoteId, RemotePost, RemoteTimestamp},
        session::Session,
        store::MemoryStore,
    };

    struct Fixed(Vec<RemotePost>);

    impl PostService for Fixed {
        fn list(&self) -> BoxFuture<'_, Result<Vec<RemotePost>, ApiError>> {
            let posts = self.0.clone();
            async move { Ok(posts) }.boxed()
        }

        fn create<'a>(&'a self, _: &'a PostDraft) -> BoxFuture<'a, Result<Option<String>, ApiError>> {
            async { Ok(None) }.boxed()
        }

        fn update<'a>(&'a self, _: &'a str, _: &'a PostDraft) -> BoxFuture<'a, Result<(), ApiError>> {
            async { Ok(()) }.boxed()
        }

        fn delete<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
            async { Ok(()) }.boxed()
        }
    }

    fn remote(id: u64, username: &str, image: Option<&str>, timestamp: &str) -> RemotePost {
        RemotePost {
            id: RemoteId::Number(id),
            username: username.to_owned(),
            content: format!("hello from {username}"),
            image: image.map(str::to_owned),
            timestamp: RemoteTimestamp::Text(timestamp.to_owned()),
        }
    }

    async fn view(posts: Vec<RemotePost>) -> FeedView {
        let mount = FeedView::mount(
            Some(Session::new("alice")),
            Arc::new(Fixed(posts)),
            Box::new(MemoryStore::new()),
            SyncConfig::default(),
        )
        .await;

        match mount {
            Mount::Shown(view) => view,
            Mount::Redirect => panic!("expected the feed to be shown"),
        }
    }

    #[tokio::test]
    async fn affordances_only_on_own_posts() {
        let view = view(vec![
            remote(1, "alice", Some("cat.png"), "2024-05-01T12:00:00Z"),
            remote(2, "bob", None, "2024-05-02T12:00:00Z"),
        ])
        .await;

        let out = view.render("%Y").to_string();
        let blocks: Vec<&str> = out.split("\n\n").skip(1).collect();

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("@bob  2024  #2\n"));
        assert!(!blocks[0].contains("[edit] [delete]"));
        assert!(blocks[1].starts_with("@alice  2024  #1  [edit] [delete]\n"));
        assert!(blocks[1].contains("  avatar https://i.pravatar.cc/150?u=alice\n"));
        assert!(blocks[1].contains("  image cat.png\n"));
        assert!(blocks[1].contains("10 Likes • 5 Comments"));
    }

    #[tokio::test]
    async fn raw_timestamp_when_unparseable() {
        let view = view(vec![remote(3, "carol", None, "someday")]).await;

        let out = view.render("%Y-%m-%d").to_string();
        assert!(out.contains("@carol  someday  #3\n"));
    }

    #[tokio::test]
    async fn empty_feed() {
        let out = view(Vec::new()).await.render("%c").to_string();

        assert_eq!(out, "signed in as alice · 0 post(s)\n\nno posts yet\n");
    }
}
