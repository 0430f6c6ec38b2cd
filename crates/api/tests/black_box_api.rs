use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = conductor_api::app::build_app();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn register_agent(client: &reqwest::Client, base_url: &str, capabilities: Value) -> Value {
    let res = client
        .post(format!("{base_url}/agents"))
        .json(&json!({"name": "it-agent", "capabilities": capabilities}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn create_task(client: &reqwest::Client, base_url: &str, body: Value) -> Value {
    let res = client
        .post(format!("{base_url}/tasks"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn poll(client: &reqwest::Client, base_url: &str, body: Value) -> Value {
    let res = client
        .post(format!("{base_url}/tasks/poll"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json::<Value>().await.unwrap()["task"].clone()
}

#[tokio::test(flavor = "multi_thread")]
async fn poll_complete_and_cascade_flow() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let agent = register_agent(&client, base, json!(["coding"])).await;
    let agent_id = agent["id"].as_str().unwrap().to_string();
    let project_id = uuid::Uuid::now_v7().to_string();

    let task = create_task(
        &client,
        base,
        json!({
            "project_id": project_id,
            "title": "implement the widget",
            "priority": 5,
            "required_capabilities": ["coding"],
        }),
    )
    .await;
    let task_id = task["id"].as_str().unwrap().to_string();

    // Poll with explicit capabilities claims the task.
    let claimed = poll(&client, base, json!({"agent_id": agent_id, "capabilities": ["coding"]})).await;
    assert_eq!(claimed["id"].as_str().unwrap(), task_id);
    assert_eq!(claimed["status"].as_str().unwrap(), "assigned");

    // Nothing else is pending: an empty poll is a null task, not an error.
    let empty = poll(&client, base, json!({"agent_id": agent_id})).await;
    assert!(empty.is_null());

    // A different agent cannot complete someone else's task.
    let intruder = register_agent(&client, base, json!([])).await;
    let res = client
        .post(format!("{base}/tasks/{task_id}/complete"))
        .json(&json!({"agent_id": intruder["id"], "output_data": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // The owner completes it.
    let res = client
        .post(format!("{base}/tasks/{task_id}/complete"))
        .json(&json!({"agent_id": agent_id, "output_data": {"files_changed": 3}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let completed: Value = res.json().await.unwrap();
    assert_eq!(completed["status"].as_str().unwrap(), "completed");
    assert_eq!(completed["output_data"]["files_changed"], 3);

    // Completing twice is a lifecycle conflict.
    let res = client
        .post(format!("{base}/tasks/{task_id}/complete"))
        .json(&json!({"agent_id": agent_id, "output_data": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // The cascade enqueued one analysis job for the completion; the runner
    // drains it.
    let res = client
        .post(format!("{base}/jobs/run"))
        .json(&json!({"batch_limit": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let run: Value = res.json().await.unwrap();
    assert_eq!(run["processed_count"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueued_job_round_trips_through_the_runner() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let task_id = uuid::Uuid::now_v7().to_string();
    let res = client
        .post(format!("{base}/jobs"))
        .json(&json!({
            "type": "analyze-completed-task",
            "payload": {"task_id": task_id},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: Value = res.json().await.unwrap();
    let job_id = job["id"].as_str().unwrap().to_string();
    assert_eq!(job["status"].as_str().unwrap(), "pending");

    let res = client
        .post(format!("{base}/jobs/run"))
        .json(&json!({"batch_limit": 10}))
        .send()
        .await
        .unwrap();
    let run: Value = res.json().await.unwrap();
    assert_eq!(run["processed_count"], 1);

    let res = client
        .get(format!("{base}/jobs/{job_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let finished: Value = res.json().await.unwrap();
    assert_eq!(finished["status"].as_str().unwrap(), "completed");
    assert_eq!(finished["result"]["task_id"].as_str().unwrap(), task_id);
    assert_eq!(finished["attempts"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn poll_falls_back_to_registered_capabilities() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let agent = register_agent(&client, base, json!(["review"])).await;
    let project_id = uuid::Uuid::now_v7().to_string();
    create_task(
        &client,
        base,
        json!({
            "project_id": project_id,
            "title": "review the widget",
            "required_capabilities": ["review"],
        }),
    )
    .await;

    // No capabilities in the request: the registry's set is used.
    let claimed = poll(&client, base, json!({"agent_id": agent["id"]})).await;
    assert_eq!(claimed["status"].as_str().unwrap(), "assigned");

    // An unregistered agent with no explicit capabilities is a 404.
    let res = client
        .post(format!("{base}/tasks/poll"))
        .json(&json!({"agent_id": uuid::Uuid::now_v7().to_string()}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_ids_and_malformed_ids_are_client_errors() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let res = client
        .post(format!("{base}/tasks/{}/complete", uuid::Uuid::now_v7()))
        .json(&json!({"agent_id": uuid::Uuid::now_v7().to_string(), "output_data": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{base}/tasks/not-a-uuid/complete"))
        .json(&json!({"agent_id": uuid::Uuid::now_v7().to_string(), "output_data": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{base}/jobs/{}", uuid::Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
