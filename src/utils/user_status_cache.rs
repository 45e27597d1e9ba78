use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

/// `is_active` of users, keyed by user id. Checked on every proof submission.
///
/// Entries are dropped on (de)activation by this instance; the short TTL
/// bounds how long another instance's change can go unnoticed.
pub static USER_STATUS_CACHE: Lazy<Cache<u64, bool>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(60))
        .build()
});

pub async fn get(user_id: u64) -> Option<bool> {
    USER_STATUS_CACHE.get(&user_id).await
}

pub async fn store(user_id: u64, active: bool) {
    USER_STATUS_CACHE.insert(user_id, active).await;
}

pub async fn invalidate(user_id: u64) {
    USER_STATUS_CACHE.invalidate(&user_id).await;
}

async fn batch_store(users: &[(u64, bool)]) {
    let futures: Vec<_> = users
        .iter()
        .map(|&(user_id, active)| USER_STATUS_CACHE.insert(user_id, active))
        .collect();

    futures::future::join_all(futures).await;
}

/// Load the status of users that logged in recently (batched)
pub async fn warmup_user_status_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (u64, bool)>(
        r#"
        SELECT id, is_active
        FROM users
        WHERE last_login_at >= NOW() - INTERVAL ? DAY
        ORDER BY last_login_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        batch.push(row?);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_store(&batch).await;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        batch_store(&batch).await;
    }

    log::info!(
        "User status cache warmup complete: {} recent users (last {} days)",
        total_count,
        days
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidated_status_is_reloaded() {
        store(90_001, true).await;
        assert_eq!(get(90_001).await, Some(true));

        invalidate(90_001).await;
        assert_eq!(get(90_001).await, None);

        batch_store(&[(90_002, false), (90_003, true)]).await;
        assert_eq!(get(90_002).await, Some(false));
        assert_eq!(get(90_003).await, Some(true));
    }
}
