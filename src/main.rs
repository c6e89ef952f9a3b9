use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use feedview::{
    api::HttpPostService,
    config::Config,
    feed::{FeedView, Mount},
    post::Post,
    session::Session,
    store::FileStore,
};

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(long, default_value = ".feedview.yml")]
    config: PathBuf,

    /// Path to local store file.
    #[arg(long, default_value = ".store.feedview.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the feed (default)
    Show,
    /// Sign in as USERNAME
    Login { username: String },
    /// Sign out
    Logout,
    /// Publish a new post
    Post {
        content: String,
        /// Image URL
        #[arg(long)]
        image: Option<String>,
    },
    /// Edit one of your posts; omitted fields keep their value
    Edit {
        id: String,
        #[arg(long)]
        content: Option<String>,
        /// Image URL
        #[arg(long, conflicts_with = "no_image")]
        image: Option<String>,
        /// Drop the image
        #[arg(long)]
        no_image: bool,
    },
    /// Delete one of your posts
    Delete { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    feedview::init_tracing();

    let Args {
        config,
        store,
        command,
    } = Args::parse();
    let command = command.unwrap_or(Command::Show);

    let cfg: Config = 'brk: {
        let file = match File::open(&config) {
            Ok(f) => BufReader::new(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => break 'brk Config::default(),
            Err(e) => {
                eprintln!("Failed to open config: {e}");
                return ExitCode::FAILURE;
            }
        };

        match serde_yaml::from_reader(file) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Failed to parse config: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let mut store = match FileStore::open(&store) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open local store: {e}");
            return ExitCode::FAILURE;
        }
    };

    match &command {
        Command::Login { username } if username.is_empty() => {
            eprintln!("Username must not be empty");
            return ExitCode::FAILURE;
        }
        Command::Login { username } => {
            return match Session::establish(&mut store, username) {
                Ok(_) => {
                    println!("Signed in as @{username}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to save session: {e}");
                    ExitCode::FAILURE
                }
            };
        }
        Command::Logout => {
            return match Session::clear(&mut store) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Failed to clear session: {e}");
                    ExitCode::FAILURE
                }
            };
        }
        _ => {}
    }

    let service = match HttpPostService::new(cfg.api_url.as_str(), cfg.request_timeout()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to set up HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let session = Session::load(&store);
    let mount = FeedView::mount(
        session,
        Arc::new(service),
        Box::new(store),
        cfg.sync.clone(),
    )
    .await;
    let mut view = match mount {
        Mount::Shown(view) => view,
        Mount::Redirect => {
            eprintln!("Not signed in, run `feedview login <username>` first");
            return ExitCode::FAILURE;
        }
    };

    let code = match command {
        Command::Post { content, image } => {
            view.begin_create();
            if let Some(form) = view.form_mut() {
                form.content = content;
                form.image = image;
            }
            view.submit();
            ExitCode::SUCCESS
        }
        Command::Edit {
            id,
            content,
            image,
            no_image,
        } => match own_post(&view, &id) {
            Ok(post) => {
                view.begin_edit(&post);
                if let Some(form) = view.form_mut() {
                    if let Some(content) = content {
                        form.content = content;
                    }
                    if no_image {
                        form.image = None;
                    } else if image.is_some() {
                        form.image = image;
                    }
                }
                view.submit();
                ExitCode::SUCCESS
            }
            Err(code) => code,
        },
        Command::Delete { id } => match own_post(&view, &id) {
            Ok(post) => {
                view.delete_post(&post.id);
                ExitCode::SUCCESS
            }
            Err(code) => code,
        },
        Command::Show | Command::Login { .. } | Command::Logout => ExitCode::SUCCESS,
    };

    view.sync().await;
    print!("{}", view.render(&cfg.time_format));

    code
}

/// Post `id` if it exists and edit/delete would be offered for it.
fn own_post(view: &FeedView, id: &str) -> Result<Post, ExitCode> {
    let Some(post) = view.find(id) else {
        eprintln!("No post #{id} in the feed");
        return Err(ExitCode::FAILURE);
    };

    if !view.can_modify(post) {
        eprintln!("Post #{id} belongs to @{}", post.username);
        return Err(ExitCode::FAILURE);
    }

    Ok(post.clone())
}
