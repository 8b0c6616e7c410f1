//! Fills a development database with users, follows, posts and comments.
//!
//! Usage: `plaza-seed [users]` (default 50). Every user's password is
//! `password` and every account is already active.

use anyhow::Context;
use rand::Rng;
use tracing::{info, warn};

use plaza_api::Config;
use plaza_crypto::PasswordService;
use plaza_db::models::{NewComment, NewPost, NewUser};
use plaza_db::{Storage, StoreError};
use plaza_types::models::roles;

const DEFAULT_USERS: usize = 50;
const POSTS_PER_USER: usize = 4;
const FOLLOWS_PER_USER: usize = 5;
const COMMENTS_PER_POST: usize = 3;

const TAGS: &[&str] = &["rust", "sqlite", "travel", "food", "music", "books", "news", "meta"];
const WORDS: &[&str] = &[
    "plaza", "morning", "coffee", "release", "weekend", "idea", "garden", "road", "river",
    "update", "photo", "question", "answer", "city", "notes",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    plaza_server::init_tracing();

    let users: usize = match std::env::args().nth(1) {
        Some(raw) => raw.parse().with_context(|| format!("invalid user count {:?}", raw))?,
        None => DEFAULT_USERS,
    };

    let config = Config::from_env()?;
    let storage = Storage::new(plaza_server::open_database(&config)?);
    let role_id = storage.roles.get_id_by_name(roles::USER).await?;

    // One hash for everybody; hashing is the slow part.
    let password = PasswordService::default().set_password("password")?;

    let mut user_ids = Vec::with_capacity(users);
    for i in 0..users {
        let created = storage
            .users
            .create(
                NewUser {
                    username: format!("user{}", i),
                    email: format!("user{}@example.com", i),
                    password: password.clone(),
                    role_id,
                },
                true,
            )
            .await;
        match created {
            Ok(user) => user_ids.push(user.id),
            Err(StoreError::DuplicateUsername | StoreError::DuplicateEmail) => {
                warn!("user{} already exists, skipping", i);
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!("Created {} users", user_ids.len());
    if user_ids.is_empty() {
        return Ok(());
    }

    let mut follows = 0;
    for &follower in &user_ids {
        for _ in 0..FOLLOWS_PER_USER.min(user_ids.len() - 1) {
            let followed = pick(&user_ids);
            if followed == follower {
                continue;
            }
            match storage.users.add_follower(followed, follower).await {
                Ok(()) => follows += 1,
                Err(StoreError::AlreadyFollows) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    info!("Created {} follows", follows);

    let mut post_ids = Vec::with_capacity(user_ids.len() * POSTS_PER_USER);
    for &author in &user_ids {
        for _ in 0..POSTS_PER_USER {
            let post = storage
                .posts
                .create(NewPost {
                    user_id: author,
                    title: sentence(3),
                    content: sentence(20),
                    tags: tags(),
                })
                .await?;
            post_ids.push(post.id);
        }
    }
    info!("Created {} posts", post_ids.len());

    let mut comments = 0;
    for &post_id in &post_ids {
        let count = rand::rng().random_range(0..=COMMENTS_PER_POST);
        for _ in 0..count {
            storage
                .comments
                .create(NewComment {
                    post_id,
                    user_id: pick(&user_ids),
                    content: sentence(8),
                })
                .await?;
            comments += 1;
        }
    }
    info!("Created {} comments", comments);

    info!("Seeding complete");
    Ok(())
}

fn pick(ids: &[i64]) -> i64 {
    ids[rand::rng().random_range(0..ids.len())]
}

fn sentence(words: usize) -> String {
    let mut rng = rand::rng();
    let mut out: Vec<&str> = Vec::with_capacity(words);
    for _ in 0..words {
        out.push(WORDS[rng.random_range(0..WORDS.len())]);
    }
    out.join(" ")
}

fn tags() -> Vec<String> {
    let mut rng = rand::rng();
    let count = rng.random_range(0..=3);
    let mut picked: Vec<String> = Vec::with_capacity(count);
    while picked.len() < count {
        let tag = TAGS[rng.random_range(0..TAGS.len())];
        if !picked.iter().any(|t| t == tag) {
            picked.push(tag.to_string());
        }
    }
    picked
}
