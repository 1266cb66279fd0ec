use crate::errors::AutomationError;
use crate::platforms::memory::NodeSpec;
use crate::tests::memory_page;
use crate::wait::{wait_for, wait_for_found, wait_for_result};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_wait_for_runs_matcher_at_least_once() {
    let mut calls = 0;
    let found = wait_for(
        || {
            calls += 1;
            None::<()>
        },
        Duration::ZERO,
        Duration::from_millis(200),
    )
    .await;
    assert!(found.is_none());
    assert_eq!(calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_gives_up_at_timeout() {
    let start = Instant::now();
    let mut calls = 0u32;
    let found = wait_for(
        || {
            calls += 1;
            None::<()>
        },
        Duration::from_secs(1),
        Duration::from_millis(200),
    )
    .await;
    assert!(found.is_none());
    assert!(start.elapsed() >= Duration::from_secs(1));
    // t = 0, 200, 400, 600, 800, 1000
    assert_eq!(calls, 6);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_sees_late_render() {
    let (memory, page) = memory_page("https://app.example.com/");
    memory
        .downgrade()
        .defer(Duration::from_millis(700), |dom| {
            let root = dom.root();
            dom.append(root, NodeSpec::button("Next"));
        });

    let start = Instant::now();
    let found = wait_for_found(
        || page.locator("exact:next").all_now(),
        Duration::from_secs(5),
        Duration::from_millis(200),
    )
    .await;
    assert_eq!(found.map(|all| all.len()), Some(1));
    assert!(start.elapsed() >= Duration::from_millis(700));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_result_awaits_matcher() {
    let mut polls = 0;
    let found = wait_for_result(
        || {
            polls += 1;
            let n = polls;
            async move { (n >= 3).then_some(n) }
        },
        Duration::from_secs(2),
        Duration::from_millis(100),
    )
    .await;
    assert_eq!(found, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_locator_wait_times_out() {
    let (_memory, page) = memory_page("https://app.example.com/");
    let err = page
        .locator("exact:never")
        .wait(Some(Duration::from_secs(3)))
        .await
        .unwrap_err();
    match err {
        AutomationError::Timeout(message) => assert!(message.contains("exact:never")),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_locator_first_finds_deferred_element() -> Result<(), AutomationError> {
    let (memory, page) = memory_page("https://app.example.com/");
    memory.downgrade().defer(Duration::from_secs(2), |dom| {
        let root = dom.root();
        dom.append(root, NodeSpec::new("div").role("menuitem").text("Add to sequence"));
    });
    let el = page
        .locator("text:add to sequence")
        .set_default_timeout(Duration::from_secs(5))
        .first(None)
        .await?;
    assert_eq!(el.role().as_deref(), Some("menuitem"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_locator_wait_enabled_skips_disabled_matches() -> Result<(), AutomationError> {
    let (memory, page) = memory_page("https://app.example.com/");
    let next = memory.mount(NodeSpec::button("Next").disabled());
    memory
        .downgrade()
        .defer(Duration::from_secs(2), move |dom| dom.remove_attr(next, "disabled"));

    let locator = page.locator("exact:next").include_disabled();
    assert_eq!(locator.all_now().len(), 1);
    assert!(locator.wait_enabled(Some(Duration::from_secs(1))).await.is_err());

    let start = Instant::now();
    let el = locator.wait_enabled(Some(Duration::from_secs(5))).await?;
    assert_eq!(el, memory.element(next));
    assert!(start.elapsed() <= Duration::from_millis(1200));
    Ok(())
}
