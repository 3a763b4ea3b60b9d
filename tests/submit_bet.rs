#![allow(non_snake_case)]
use dice_game::{
    bet::{
        BetRequest,
        Direction,
        Stake,
    },
    payload::{
        AccountAddress,
        EntryArgument,
    },
    submitter::{
        CancelToken,
        SubmissionError,
        cancel_pair,
    },
    test_helpers::{
        ALICE,
        FakeChain,
        FakeWallet,
        MODULE,
        TestContext,
    },
};
use std::time::Duration;

fn bet(raw: &str, direction: Direction) -> BetRequest {
    BetRequest {
        stake: Stake::parse(raw, 8).unwrap(),
        direction,
    }
}

#[tokio::test]
async fn submit_bet__sends_owner_stake_and_direction_in_order() {
    // given
    let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
    let submitter = ctx.submitter();
    let request = bet("1.5", Direction::High);

    // when
    let settlement = submitter
        .submit_bet(&request, CancelToken::never())
        .await
        .unwrap();

    // then
    let submitted = ctx.wallet.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0].function,
        format!("{MODULE}::DiceGame::play_dice")
    );
    assert_eq!(
        submitted[0].arguments,
        vec![
            EntryArgument::Address(MODULE.parse().unwrap()),
            EntryArgument::U64(150_000_000),
            EntryArgument::Bool(true),
        ]
    );
    assert_eq!(ctx.chain.waited_on(), vec![settlement.handle]);
}

#[tokio::test]
async fn submit_bet__low_bet_sends_false() {
    // given
    let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
    let submitter = ctx.submitter();

    // when
    submitter
        .submit_bet(&bet("1", Direction::Low), CancelToken::never())
        .await
        .unwrap();

    // then
    let submitted = ctx.wallet.submitted();
    assert_eq!(submitted[0].arguments[1], EntryArgument::U64(100_000_000));
    assert_eq!(submitted[0].arguments[2], EntryArgument::Bool(false));
}

#[tokio::test]
async fn submit_bet__fails_without_wallet_and_sends_nothing() {
    // given
    let ctx = TestContext::new(FakeWallet::disconnected(), FakeChain::confirming());
    let submitter = ctx.submitter();

    // when
    let res = submitter
        .submit_bet(&bet("2", Direction::High), CancelToken::never())
        .await;

    // then
    assert!(matches!(res, Err(SubmissionError::NotConnected)));
    assert!(ctx.wallet.submitted().is_empty());
    assert!(ctx.chain.waited_on().is_empty());
}

#[tokio::test]
async fn submit_bet__refuses_stake_parsed_with_other_decimals() {
    // given
    let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
    let submitter = ctx.submitter();
    let request = BetRequest {
        stake: Stake::parse("1", 6).unwrap(),
        direction: Direction::High,
    };

    // when
    let res = submitter.submit_bet(&request, CancelToken::never()).await;

    // then
    assert!(matches!(
        res,
        Err(SubmissionError::UnitMismatch {
            expected: 8,
            actual: 6
        })
    ));
    assert!(ctx.wallet.submitted().is_empty());
}

#[tokio::test]
async fn submit_bet__wallet_rejection_is_reported() {
    // given
    let ctx = TestContext::new(
        FakeWallet::rejecting("user rejected the request"),
        FakeChain::confirming(),
    );
    let submitter = ctx.submitter();

    // when
    let res = submitter
        .submit_bet(&bet("1", Direction::High), CancelToken::never())
        .await;

    // then
    let Err(SubmissionError::SubmissionRejected(cause)) = res else {
        panic!("expected rejection, got {res:?}");
    };
    assert!(cause.to_string().contains("user rejected"));
    assert!(ctx.chain.waited_on().is_empty());
}

#[tokio::test]
async fn submit_bet__aborted_execution_fails_confirmation() {
    // given
    let ctx = TestContext::new(
        FakeWallet::connected(),
        FakeChain::aborting("Move abort in DiceGame: 0x1"),
    );
    let submitter = ctx.submitter();

    // when
    let res = submitter
        .submit_bet(&bet("1", Direction::High), CancelToken::never())
        .await;

    // then
    let Err(SubmissionError::ConfirmationFailed { handle, cause }) = res else {
        panic!("expected confirmation failure, got {res:?}");
    };
    assert!(handle.is_some());
    assert!(cause.to_string().contains("Move abort"));
}

#[tokio::test]
async fn submit_bet__chain_error_fails_confirmation() {
    // given
    let ctx = TestContext::new(
        FakeWallet::connected(),
        FakeChain::failing("node responded with 503 Service Unavailable"),
    );
    let submitter = ctx.submitter();

    // when
    let res = submitter
        .submit_bet(&bet("1", Direction::High), CancelToken::never())
        .await;

    // then
    let Err(SubmissionError::ConfirmationFailed { handle, cause }) = res else {
        panic!("expected confirmation failure, got {res:?}");
    };
    assert_eq!(ctx.chain.waited_on(), vec![handle.unwrap()]);
    assert!(cause.to_string().contains("503"));
}

#[tokio::test]
async fn submit_bet__times_out_on_stalled_chain() {
    // given
    let ctx = TestContext::new(FakeWallet::connected(), FakeChain::stalled());
    let submitter = ctx.submitter();

    // when
    let res = submitter
        .submit_bet(&bet("1", Direction::High), CancelToken::never())
        .await;

    // then
    let err = res.unwrap_err();
    assert!(err.to_string().ends_with("after 200ms"));
    let SubmissionError::ConfirmationTimeout { after, .. } = err else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(after, Duration::from_millis(200));
}

#[tokio::test]
async fn submit_bet__cancel_stops_the_wait() {
    // given
    let ctx = TestContext::new(FakeWallet::connected(), FakeChain::stalled());
    let submitter = ctx.submitter();
    let (cancel, token) = cancel_pair();
    let request = bet("1", Direction::High);
    let task = tokio::spawn(async move { submitter.submit_bet(&request, token).await });

    // when
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let res = task.await.unwrap();

    // then
    assert!(matches!(
        res,
        Err(SubmissionError::Cancelled { handle: Some(_) })
    ));
    assert_eq!(ctx.wallet.submitted().len(), 1);
}

#[tokio::test]
async fn submit_bet__cancel_stops_a_stalled_wallet() {
    // given
    let ctx = TestContext::new(FakeWallet::stalling(), FakeChain::confirming());
    let submitter = ctx.submitter();
    let (cancel, token) = cancel_pair();
    let request = bet("1", Direction::High);
    let task = tokio::spawn(async move { submitter.submit_bet(&request, token).await });

    // when
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let res = tokio::time::timeout(Duration::from_millis(100), task)
        .await
        .expect("submission should settle promptly after cancel")
        .unwrap();

    // then
    assert!(matches!(
        res,
        Err(SubmissionError::Cancelled { handle: None })
    ));
    assert!(ctx.chain.waited_on().is_empty());
}

#[tokio::test]
async fn submit_bet__stalled_wallet_is_bounded_by_timeout() {
    // given
    let ctx = TestContext::new(FakeWallet::stalling(), FakeChain::confirming());
    let submitter = ctx.submitter();

    // when
    let res = tokio::time::timeout(
        Duration::from_secs(2),
        submitter.submit_bet(&bet("1", Direction::High), CancelToken::never()),
    )
    .await
    .expect("submission should give up at the configured timeout");

    // then
    let Err(SubmissionError::SubmissionRejected(cause)) = res else {
        panic!("expected rejection, got {res:?}");
    };
    assert!(cause.to_string().contains("did not submit within 200ms"));
    assert!(ctx.wallet.submitted().is_empty());
    assert!(ctx.chain.waited_on().is_empty());
}

#[tokio::test]
async fn account__reports_connected_wallet() {
    let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());

    let account = ctx.submitter().account().unwrap();

    assert_eq!(account, ALICE.parse::<AccountAddress>().unwrap());
}
