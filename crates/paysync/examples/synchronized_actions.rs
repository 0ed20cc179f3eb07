//! Synchronized Actions Example
//!
//! Demonstrates the executor against a scripted page:
//! - An element that appears late (readiness wait)
//! - A click intercepted by an overlay (script fallback)
//! - A dropdown query without an exact match (descriptive timeout)
//!
//! # Running
//!
//! ```bash
//! cargo run --example synchronized_actions -p paysync
//! ```

use paysync::prelude::*;
use paysync::{ExecutorConfig, MockEffect, SearchableDropdown};
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> SyncResult<()> {
    println!("=== PaySync Synchronized Actions Example ===\n");

    demo_late_element().await?;
    demo_obscured_click().await?;
    demo_dropdown_without_match().await;

    println!("\n=== Synchronized Actions Example Complete ===");
    Ok(())
}

fn config() -> ExecutorConfig {
    ExecutorConfig::default()
        .with_action_timeout(Duration::from_secs(2))
        .with_page_timeout(Duration::from_secs(2))
}

async fn demo_late_element() -> SyncResult<()> {
    println!("--- Demo 1: Late Element ---\n");

    let driver = MockDriver::new().with_element(
        MockElement::new(Selector::css("button.pay")).appear_after(Duration::from_millis(600)),
    );
    let exec = SyncExecutor::with_config(&driver, config());
    let pay = Locator::css("button.pay").named("Pay");

    let outcome = exec.perform(&pay, &Action::Click, Duration::from_secs(2)).await?;
    println!("Outcome: success={}", outcome.is_success());
    println!("Trail:   {:?}\n", outcome.trail());
    Ok(())
}

async fn demo_obscured_click() -> SyncResult<()> {
    println!("--- Demo 2: Obscured Click ---\n");

    let driver = MockDriver::new().with_element(
        MockElement::new(Selector::css("button.close"))
            .obscured("div.modal-fade")
            .on_click(MockEffect::Conceal {
                selector: Selector::css("button.close"),
                after: Duration::from_millis(100),
            }),
    );
    let exec = SyncExecutor::with_config(&driver, config());
    let close = Locator::css("button.close").named("Close");

    let outcome = exec.perform(&close, &Action::Click, Duration::from_secs(2)).await?;
    println!("Outcome: {outcome:?}");
    println!("Script clicks: {}\n", driver.call_count("dispatch_click:"));
    Ok(())
}

async fn demo_dropdown_without_match() {
    println!("--- Demo 3: Dropdown Without Exact Match ---\n");

    let driver = MockDriver::new()
        .with_element(MockElement::new(Selector::css("div.account")))
        .with_element(MockElement::new(Selector::css("div.account input")))
        .with_element(MockElement::new(Selector::css("div.option")).with_text("Main Account 2"));
    let exec = SyncExecutor::with_config(&driver, config());
    let dropdown = SearchableDropdown::new(
        Locator::css("div.account").named("Account"),
        Locator::css("div.account input").named("Account search"),
        Locator::css("div.option").named("Account options"),
    );

    match exec
        .select_from_searchable_dropdown(&dropdown, "Main Account")
        .await
    {
        Ok(()) => println!("Selected (unexpected)"),
        Err(e) => println!("Error: {e}"),
    }
}
