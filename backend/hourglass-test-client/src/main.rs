// src/main.rs

use chrono::{Datelike, Duration, Local, NaiveDate};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

// Response types
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    features: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    user: Member,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Member {
    id: String,
    email: String,
    role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timesheet {
    id: String,
    week_start: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
    message: Option<String>,
}

fn current_monday() -> NaiveDate {
    let today = Local::now().date_naive();
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

fn bearer(token: &str) -> Result<header::HeaderMap, Box<dyn Error>> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token))?,
    );
    Ok(headers)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url =
        std::env::var("HOURGLASS_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let client = Client::new();

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health: {} (features: {})", health.status, health.features.join(", "));

    // Test 2: Register a throwaway account
    println!("\n🔍 Registering a smoke-test account...");
    let email = format!("smoke+{}@example.com", Local::now().timestamp());
    let password = "smoke-test-password";
    let response = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "name": "Smoke Test",
            "email": email,
            "password": password,
            "company": "QA"
        }))
        .send()
        .await?;
    println!("Register status: {}", response.status());
    if response.status() != StatusCode::CREATED {
        println!("Registration failed: {}", response.text().await?);
        return Ok(());
    }

    // Test 3: Log in with the same credentials
    println!("\n🔍 Logging in...");
    let auth = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await?
        .json::<AuthResponse>()
        .await?;
    println!(
        "Logged in as {} ({}, role {})",
        auth.user.email, auth.user.id, auth.user.role
    );
    let headers = bearer(&auth.token)?;

    // Test 4: Request without a token must be refused
    println!("\n🔍 Checking that protected routes need a token...");
    let anonymous = client
        .get(format!("{}/api/time-entries", base_url))
        .send()
        .await?;
    println!("Anonymous status: {} (expected 401)", anonymous.status());

    // Test 5: Fill in this week's timesheet
    println!("\n🔍 Creating a timesheet for the current week...");
    let response = client
        .post(format!("{}/api/time-entries", base_url))
        .headers(headers.clone())
        .json(&json!({
            "weekStart": current_monday().to_string(),
            "hours": [8, 8, 7.5, 8, 6, 0, 0],
            "notes": "Created by the smoke-test client"
        }))
        .send()
        .await?;
    println!("Create status: {}", response.status());
    if !response.status().is_success() {
        println!("Failed to create timesheet: {}", response.text().await?);
        return Ok(());
    }
    let created = response.json::<Envelope<Timesheet>>().await?;
    println!(
        "Timesheet {} for week {} is {}",
        created.data.id, created.data.week_start, created.data.status
    );

    // Test 6: Submit it
    println!("\n🔍 Submitting the timesheet...");
    let response = client
        .post(format!(
            "{}/api/time-entries/{}/submit",
            base_url, created.data.id
        ))
        .headers(headers.clone())
        .send()
        .await?;
    println!("Submit status: {}", response.status());
    if response.status().is_success() {
        let submitted = response.json::<Envelope<Timesheet>>().await?;
        println!(
            "{} (status now {})",
            submitted.message.unwrap_or_default(),
            submitted.data.status
        );
    } else {
        println!("Failed to submit: {}", response.text().await?);
    }

    // Test 7: Personal report
    println!("\n🔍 Fetching report summary...");
    let summary = client
        .get(format!("{}/api/reports/summary", base_url))
        .headers(headers)
        .send()
        .await?
        .json::<Value>()
        .await?;
    println!(
        "Total hours: {}, revenue: {}",
        summary["data"]["totalHours"], summary["data"]["revenue"]
    );

    // Test 8: Rate limiting (optional)
    println!("\n🔍 Testing rate limiting...");
    println!("Sending 150 requests to trigger rate limit...");

    let mut success_count = 0;
    let mut failure_count = 0;

    for i in 1..=150 {
        let response = client.get(format!("{}/health", base_url)).send().await?;

        if response.status().is_success() {
            success_count += 1;
        } else {
            failure_count += 1;
            if failure_count == 1 {
                println!("Request {} failed with status: {}", i, response.status());
            }
        }
    }

    println!("Rate limit test results:");
    println!("  Successful requests: {}", success_count);
    println!("  Failed requests (rate limited): {}", failure_count);

    println!("\n✅ Testing complete!");

    Ok(())
}
