use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

const MINUTE: i64 = 60_000;
const WEEK: i64 = 7 * 24 * 60 * MINUTE;
/// 2024-01-01T08:00:00Z, a Monday.
const MONDAY_8AM: i64 = 1_704_096_000_000;
const LESSON: i64 = 90 * MINUTE;

struct Target {
    host: String,
    port: u16,
    password: String,
}

fn tenant_name(label: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("bench_{label}_{nanos}")
}

async fn connect(target: &Target, db: &str) -> Client {
    let mut config = Config::new();
    config
        .host(&target.host)
        .port(target.port)
        .dbname(db)
        .user("admin")
        .password(&target.password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

async fn insert_returning_id(client: &Client, sql: &str) -> i64 {
    let messages = client.simple_query(sql).await.unwrap();
    messages
        .iter()
        .find_map(|m| match m {
            SimpleQueryMessage::Row(row) => row.get("id").and_then(|id| id.parse().ok()),
            _ => None,
        })
        .expect("RETURNING produced no id")
}

async fn teacher(client: &Client, name: &str, hours: u32) -> i64 {
    insert_returning_id(
        client,
        &format!(
            "INSERT INTO teachers (name, subject, working_hours) VALUES ('{name}', 'Bench', {hours}) RETURNING *"
        ),
    )
    .await
}

async fn classroom(client: &Client, name: &str) -> i64 {
    insert_returning_id(
        client,
        &format!("INSERT INTO classrooms (name, capacity) VALUES ('{name}', 40) RETURNING *"),
    )
    .await
}

/// Monday lesson number `slot`: four per day, one Monday per week.
fn lesson_start(slot: i64) -> i64 {
    MONDAY_8AM + (slot / 4) * WEEK + (slot % 4) * (LESSON + 30 * MINUTE)
}

fn proposal(teacher_id: i64, classroom_id: i64, group: &str, start: i64) -> String {
    format!(
        "INSERT INTO schedules (teacher_id, classroom_id, group_name, start_time, end_time, day_of_week) \
         VALUES ({teacher_id}, {classroom_id}, '{group}', {start}, {}, 'Monday')",
        start + LESSON
    )
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(target: &Target) {
    let client = connect(target, &tenant_name("seq")).await;
    let t = teacher(&client, "Seq", 10_000).await;
    let c = classroom(&client, "Hall").await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for slot in 0..n as i64 {
        let sql = proposal(t, c, &format!("G-{slot}"), lesson_start(slot));
        let began = Instant::now();
        client.batch_execute(&sql).await.unwrap();
        latencies.push(began.elapsed());
    }
    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} admissions in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("admission latency", &mut latencies);
}

/// Disjoint teachers in one tenant: admissions only meet on the catalog.
async fn phase2_parallel_teachers(target: &Target) {
    let db = tenant_name("par");
    let setup = connect(target, &db).await;
    let room = classroom(&setup, "Shared").await;

    let n_tasks = 10;
    let n_per_task = 200;
    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let client = connect(target, &db).await;
        let t = teacher(&client, &format!("Par-{task}"), 10_000).await;
        handles.push(tokio::spawn(async move {
            for slot in 0..n_per_task {
                client
                    .batch_execute(&proposal(t, room, &format!("P{task}-{slot}"), lesson_start(slot)))
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} teachers x {n_per_task} admissions = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Many sessions race for the same slots of one teacher. Exactly one wins each slot.
async fn phase3_contended_slots(target: &Target) {
    let db = tenant_name("race");
    let setup = connect(target, &db).await;
    let t = teacher(&setup, "Contended", 10_000).await;
    let room = classroom(&setup, "Arena").await;

    let n_tasks = 16;
    let n_slots = 100;
    let admitted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let client = connect(target, &db).await;
        let admitted = admitted.clone();
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            for slot in 0..n_slots {
                let sql = proposal(t, room, &format!("R{task}-{slot}"), lesson_start(slot));
                match client.batch_execute(&sql).await {
                    Ok(()) => admitted.fetch_add(1, Ordering::Relaxed),
                    Err(_) => rejected.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let won = admitted.load(Ordering::Relaxed);
    let lost = rejected.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} sessions x {n_slots} slots: {won} admitted, {lost} rejected in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, n_slots as usize, "every slot must be admitted exactly once");
}

/// Conflict checks while writers keep admitting.
async fn phase4_checks_under_load(target: &Target) {
    let db = tenant_name("checks");
    let setup = connect(target, &db).await;
    let room = classroom(&setup, "Checks").await;
    let checked = teacher(&setup, "Checked", 10_000).await;
    for slot in 0..200 {
        setup
            .batch_execute(&proposal(checked, room, &format!("Q-{slot}"), lesson_start(slot)))
            .await
            .unwrap();
    }

    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..4 {
        let client = connect(target, &db).await;
        let t = teacher(&client, &format!("Writer-{w}"), 10_000).await;
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let mut slot = 0;
            while !stop.load(Ordering::Relaxed) {
                let _ = client
                    .batch_execute(&proposal(t, room, &format!("W{w}-{slot}"), lesson_start(slot)))
                    .await;
                slot += 1;
            }
        }));
    }

    let n_readers = 8;
    let checks_per_reader = 500;
    let mut readers = Vec::new();
    for _ in 0..n_readers {
        let client = connect(target, &db).await;
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(checks_per_reader);
            for i in 0..checks_per_reader as i64 {
                let start = lesson_start(i % 200) + 30 * MINUTE;
                let sql = format!(
                    "SELECT * FROM conflicts WHERE teacher_id = {checked} AND day_of_week = 'Monday' \
                     AND start_time = {start} AND end_time = {}",
                    start + LESSON
                );
                let began = Instant::now();
                client.simple_query(&sql).await.unwrap();
                latencies.push(began.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("conflict check", &mut all);
}

#[tokio::main]
async fn main() {
    let target = Target {
        host: std::env::var("REGISTRAR_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
        port: std::env::var("REGISTRAR_PORT")
            .unwrap_or_else(|_| "5433".into())
            .parse()
            .expect("invalid REGISTRAR_PORT"),
        password: std::env::var("REGISTRAR_ADMIN_PASSWORD").unwrap_or_else(|_| "registrar".into()),
    };

    println!("=== registrar admission benchmark ===");
    println!("target: {}:{}\n", target.host, target.port);

    println!("[phase 1] sequential admissions");
    phase1_sequential(&target).await;

    println!("\n[phase 2] parallel admissions, disjoint teachers");
    phase2_parallel_teachers(&target).await;

    println!("\n[phase 3] contended slots, one teacher");
    phase3_contended_slots(&target).await;

    println!("\n[phase 4] conflict checks under write load");
    phase4_checks_under_load(&target).await;

    println!("\n=== done ===");
}
