use dotenv::dotenv;
use postgrest_fluent::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Task {
    id: Option<i32>,
    title: String,
    description: Option<String>,
    is_complete: bool,
}

impl Table for Task {
    fn table_name() -> &'static str {
        "tasks"
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load POSTGREST_URL / POSTGREST_API_KEY / POSTGREST_SCHEMA from .env
    dotenv().ok();

    let client = Client::from_env()?;
    println!("Using PostgREST URL: {}", client.url);

    // Example 1: INSERT
    println!("\nExample 1: INSERT");
    let rows: Vec<_> = (1..6)
        .map(|i| {
            json!({
                "title": format!("Task {}", i),
                "description": format!("Description for task {}", i),
                "is_complete": i % 2 == 0,
            })
        })
        .collect();
    let inserted = client
        .from_model::<Task>()
        .insert(&rows)?
        .execute()
        .await?;
    println!("Created {} tasks", inserted.data.len());

    // Example 2: SELECT with filters, ordering and a count
    println!("\nExample 2: SELECT");
    // 未完了のタスクを取得
    let incomplete = client
        .from_model::<Task>()
        .select_with_count("id,title,is_complete", CountMethod::Exact)
        .eq("is_complete", false)
        .order("id", SortOrder::Ascending)
        .limit(10)
        .execute()
        .await?;
    println!(
        "Incomplete tasks: {} (total {:?})",
        incomplete.data.len(),
        incomplete.count
    );

    // Example 3: OR filter
    println!("\nExample 3: OR filter");
    let either = client
        .from("tasks")
        .select("title")
        .or(vec![
            Filter::eq("title", "Task 1").into(),
            Filter::eq("title", "Task 5").into(),
        ])?
        .execute()
        .await?;
    println!("Found {} tasks titled Task 1 or Task 5", either.data.len());

    // Example 4: UPDATE
    println!("\nExample 4: UPDATE");
    let updated = client
        .from_model::<Task>()
        .update(json!({ "is_complete": true }))?
        .like("title", "Task%")
        .execute()
        .await?;
    println!("Marked {} tasks complete", updated.data.len());

    // Example 5: CSV export
    println!("\nExample 5: CSV export");
    let csv = client.from("tasks").select("id,title").export_csv().await?;
    println!("{}", csv);

    // Example 6: DELETE
    println!("\nExample 6: DELETE");
    let ids: Vec<i32> = inserted.data.iter().filter_map(|t| t.id).collect();
    client
        .from("tasks")
        .delete_with(MutationOptions::default().with_returning(ReturnMethod::Minimal))
        .in_list("id", &ids)?
        .execute()
        .await?;
    println!("Deleted {} tasks", ids.len());

    Ok(())
}
