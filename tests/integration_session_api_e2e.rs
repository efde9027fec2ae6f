use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use serde_json::json;
use uuid::Uuid;

// Shared test context
struct TestContext {
    client: reqwest::Client,
    base_url: String,
}

static REDIS_CLIENT: Lazy<redis::Client> = Lazy::new(|| {
    redis::Client::open("redis://127.0.0.1:6379/").unwrap()
});

impl TestContext {
    fn new() -> Self {
        Self {
            client: reqwest::Client::builder().build().unwrap(),
            base_url: "http://127.0.0.1:3000".to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn get_redis_conn() -> ConnectionManager {
    REDIS_CLIENT.get_connection_manager().await.unwrap()
}

/// Issues an auth token for a fresh user, the way the external provider would.
async fn login_as(user_id: Uuid) -> String {
    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let session = json!({
        "user_id": user_id,
        "created_at": now,
        "expires_at": now + Duration::hours(1),
    });

    let mut con = get_redis_conn().await;
    let _: () = redis::cmd("SET")
        .arg(format!("session:{}", token))
        .arg(session.to_string())
        .arg("EX")
        .arg(3600)
        .query_async(&mut con)
        .await
        .unwrap();
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    #[ignore = "needs the server on 127.0.0.1:3000 with Postgres and Redis"]
    async fn test_couple_session_tasks_and_secret_reward() {
        let context = TestContext::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let alice_token = login_as(alice).await;
        let bob_token = login_as(bob).await;

        // Step 1: Partnership
        let resp = context.client.post(context.url("/api/partnerships"))
            .bearer_auth(&alice_token)
            .json(&json!({ "partner_user_id": bob }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201, "Partnership creation failed");
        let partnership: Value = resp.json().await.unwrap();
        let partnership_id = partnership["id"].as_str().unwrap().to_string();

        // Step 2: Session
        let start = Utc::now() + Duration::hours(1);
        let resp = context.client.post(context.url("/api/sessions"))
            .bearer_auth(&alice_token)
            .json(&json!({
                "partnership_id": partnership_id,
                "title": "Sunday Deep Work Date",
                "start_time": start,
                "end_time": start + Duration::hours(2),
                "mode": "online",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201, "Session creation failed");
        let session: Value = resp.json().await.unwrap();
        let session_id = session["id"].as_str().unwrap().to_string();
        assert_eq!(session["kind"], "couple");
        assert_eq!(session["participants"].as_array().unwrap().len(), 2);

        // Step 3: Alice adds a task and completes it
        let resp = context.client.post(context.url(&format!("/api/sessions/{}/tasks", session_id)))
            .bearer_auth(&alice_token)
            .json(&json!({ "title": "Write tests", "difficulty": "medium" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201, "Task creation failed");
        let task: Value = resp.json().await.unwrap();
        let task_id = task["id"].as_str().unwrap().to_string();
        assert_eq!(task["done"], false);
        assert_eq!(task["revision"], 1);

        let resp = context.client.patch(context.url(&format!("/api/tasks/{}", task_id)))
            .bearer_auth(&alice_token)
            .json(&json!({ "is_done": true }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200, "Task toggle failed");
        let task: Value = resp.json().await.unwrap();
        assert_eq!(task["done"], true);
        assert_eq!(task["revision"], 2);

        // Step 4: Bob may not touch Alice's task
        let resp = context.client.patch(context.url(&format!("/api/tasks/{}", task_id)))
            .bearer_auth(&bob_token)
            .json(&json!({ "difficulty": "easy" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 403, "Foreign task update must be refused");

        // Step 5: Alice leaves Bob a reward
        let resp = context.client.post(context.url(&format!("/api/sessions/{}/rewards", session_id)))
            .bearer_auth(&alice_token)
            .json(&json!({ "description": "Coffee" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201, "Reward creation failed");
        let reward: Value = resp.json().await.unwrap();
        assert!(reward.get("description").is_none(), "Giver must not see the description");

        // Step 6: Both projections
        let alice_view: Value = context.client.get(context.url(&format!("/api/sessions/{}", session_id)))
            .bearer_auth(&alice_token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let bob_view: Value = context.client.get(context.url(&format!("/api/sessions/{}", session_id)))
            .bearer_auth(&bob_token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(alice_view["tasks"], bob_view["tasks"]);
        assert_eq!(bob_view["tasks"][0]["done"], true);
        assert!(alice_view["rewards"][0].get("description").is_none());
        assert_eq!(bob_view["rewards"][0]["description"], "Coffee");

        // Step 7: Deleting the task, then deleting it again
        let resp = context.client.delete(context.url(&format!("/api/tasks/{}", task_id)))
            .bearer_auth(&alice_token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204, "Task deletion failed");

        let resp = context.client.delete(context.url(&format!("/api/tasks/{}", task_id)))
            .bearer_auth(&alice_token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404, "Second delete should find nothing");
    }

    #[tokio::test]
    #[ignore = "needs the server on 127.0.0.1:3000 with Postgres and Redis"]
    async fn test_outsider_and_anonymous_are_refused() {
        let context = TestContext::new();

        let resp = context.client.get(context.url(&format!("/api/sessions/{}", Uuid::new_v4())))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 401, "Missing token must be refused");

        let token = login_as(Uuid::new_v4()).await;
        let resp = context.client.get(context.url(&format!("/api/sessions/{}", Uuid::new_v4())))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404, "Unknown session should be 404");

        let resp = context.client.post(context.url("/api/sessions"))
            .bearer_auth(&token)
            .json(&json!({
                "title": "   ",
                "start_time": Utc::now(),
                "end_time": Utc::now() + Duration::hours(1),
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400, "Blank title must be rejected");
    }

    #[tokio::test]
    #[ignore = "needs the server on 127.0.0.1:3000 with Postgres and Redis"]
    async fn test_solo_sessions_are_listed_with_filters() {
        let context = TestContext::new();
        let host = Uuid::new_v4();
        let token = login_as(host).await;
        let start = Utc::now() + Duration::days(1);

        // Step 1: One online and one offline solo session
        let resp = context.client.post(context.url("/api/sessions"))
            .bearer_auth(&token)
            .json(&json!({
                "title": "Rust pairing",
                "start_time": start,
                "end_time": start + Duration::hours(2),
                "mode": "online",
                "description": "Working through a parser",
                "tech_stack": ["rust", "postgres"],
                "partner_prefs": { "role": ["backend"] },
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201, "Solo session creation failed");
        let online: Value = resp.json().await.unwrap();
        assert_eq!(online["kind"], "solo");
        assert_eq!(online["listing"]["status"], "open");
        assert_eq!(online["listing"]["techStack"], json!(["rust", "postgres"]));
        assert_eq!(online["listing"]["partnerPreferences"]["level"], "Any");

        let resp = context.client.post(context.url("/api/sessions"))
            .bearer_auth(&token)
            .json(&json!({
                "title": "Cafe focus block",
                "start_time": start + Duration::days(1),
                "end_time": start + Duration::days(1) + Duration::hours(1),
                "mode": "offline",
                "location": "Blue Bottle",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201, "Offline solo session creation failed");

        // Step 2: Listing, newest first, then filtered
        let all: Value = context.client.get(context.url("/api/sessions?kind=solo"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let all = all.as_array().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["title"], "Cafe focus block");

        let online_only: Value = context.client.get(context.url("/api/sessions?kind=solo&mode=online&status=open"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(online_only.as_array().unwrap().len(), 1);
        assert_eq!(online_only[0]["id"], online["id"]);

        let day = start.date_naive().to_string();
        let that_day: Value = context.client.get(context.url(&format!("/api/sessions?date={}", day)))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(that_day.as_array().unwrap().len(), 1);

        // Step 3: Somebody else's listing is empty
        let stranger = login_as(Uuid::new_v4()).await;
        let theirs: Value = context.client.get(context.url("/api/sessions?kind=solo"))
            .bearer_auth(&stranger)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(theirs.as_array().unwrap().is_empty());
    }
}
