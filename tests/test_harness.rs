// Bootloader navigation and fault classification over synthetic consoles

mod common;

use autopilot::console::OperatorInput;
use autopilot::harness::{classify, FaultClass, HarnessContext, HarnessOutcome, Variant};
use autopilot::transcript::{Tee, Transcript};
use autopilot::HarnessError;
use common::{fast_boot_script, fast_detection, fast_ready, FakeBoard, ScriptedConsoles, BOOT_MENU};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn context(board: &Arc<FakeBoard>, consoles: ScriptedConsoles) -> HarnessContext {
    HarnessContext {
        board: board.clone(),
        consoles: Arc::new(consoles),
        boot: fast_boot_script(),
        echo: false,
    }
}

fn transcript(dir: &TempDir) -> (Transcript, DuplexStream) {
    let (near, far) = tokio::io::duplex(64 * 1024);
    let tee = Tee::open(&dir.path().join("uart-raw.log"), false).unwrap();
    (Transcript::new(Box::new(near), tee), far)
}

async fn received(far: &mut DuplexStream) -> Vec<u8> {
    let mut buf = vec![0u8; 256];
    match tokio::time::timeout(Duration::from_millis(100), far.read(&mut buf)).await {
        Ok(Ok(n)) => buf[..n].to_vec(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn test_netboot_fallthrough_is_retried() {
    let dir = TempDir::new().unwrap();
    let board = Arc::new(FakeBoard::default());
    let ctx = context(
        &board,
        ScriptedConsoles::default().primary(format!(
            ">>Start PXE over IPv4.\r\n{}Kernel panic - not syncing\r\n",
            BOOT_MENU
        )),
    );

    let outcome = ctx
        .run(
            &Variant::FaultClassify(fast_detection()),
            &dir.path().join("uart-raw.log"),
            &mut OperatorInput::none(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, HarnessOutcome::Classified(FaultClass::Panic));
    // First attempt rides the update's reboot; the retry power-cycles
    assert_eq!(board.boots(), vec![false]);
}

#[tokio::test]
async fn test_netboot_on_every_attempt_exhausts_retries() {
    let dir = TempDir::new().unwrap();
    let board = Arc::new(FakeBoard::default());
    let ctx = context(
        &board,
        ScriptedConsoles::default().primary("Start PXE over IPv4\r\n".repeat(3)),
    );

    let err = ctx
        .run(
            &Variant::FaultClassify(fast_detection()),
            &dir.path().join("uart-raw.log"),
            &mut OperatorInput::none(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::BootRetriesExhausted { attempts: 3 })
    ));
    assert_eq!(board.boots(), vec![false, false]);
}

#[tokio::test]
async fn test_missing_firmware_prompt_is_hard_error() {
    let dir = TempDir::new().unwrap();
    let board = Arc::new(FakeBoard::default());
    let ctx = context(&board, ScriptedConsoles::default().primary("garbage\r\n"));

    let err = ctx
        .run(
            &Variant::FaultClassify(fast_detection()),
            &dir.path().join("uart-raw.log"),
            &mut OperatorInput::none(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::MarkerTimeout { .. })
    ));
}

#[tokio::test]
async fn test_ready_wait_selects_vanilla_entry() {
    let dir = TempDir::new().unwrap();
    let board = Arc::new(FakeBoard::default());
    let consoles = ScriptedConsoles::default().primary(format!("{}{}", BOOT_MENU, common::SHELL_PROMPT));
    let ctx = context(&board, consoles);

    ctx.ready(&fast_ready(), &dir.path().join("recovery.log"))
        .await
        .unwrap();
    assert_eq!(board.boots(), vec![false]);
    let log = std::fs::read_to_string(dir.path().join("recovery.log")).unwrap();
    assert!(log.contains("Press any other key to boot default"));
    assert!(log.contains(common::SHELL_PROMPT));
}

#[tokio::test]
async fn test_ready_wait_without_prompt_is_not_ready() {
    let dir = TempDir::new().unwrap();
    let board = Arc::new(FakeBoard::default());
    let ctx = context(&board, ScriptedConsoles::default().primary(BOOT_MENU));

    let err = ctx
        .ready(&fast_ready(), &dir.path().join("recovery.log"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::NotReady { .. })
    ));
}

#[tokio::test]
async fn test_menu_steps_are_navigated() {
    let dir = TempDir::new().unwrap();
    let board = Arc::new(FakeBoard::default());
    let consoles = ScriptedConsoles::default().primary(format!(
        "Press ESCAPE for boot options\r\nBoot Manager\r\nPress any other key to boot default\r\n{}",
        common::SHELL_PROMPT
    ));
    let mut ctx = context(&board, consoles);
    ctx.boot.menu_steps = vec![autopilot::config::MenuStep {
        marker: "Boot Manager".to_string(),
        down: 2,
    }];

    ctx.ready(&fast_ready(), &dir.path().join("ready.log"))
        .await
        .unwrap();
    let log = std::fs::read(dir.path().join("ready.log")).unwrap();
    let sent = b"\x1b[B\x1b[B\r1";
    assert!(log.windows(sent.len()).any(|w| w == sent));
}

#[tokio::test]
async fn test_emergency_shell_is_confirmed_then_classified() {
    let dir = TempDir::new().unwrap();
    let (mut transcript, mut far) = transcript(&dir);
    far.write_all(b"You are in emergency mode.\r\nPress [ENTER] to start bash\r\n")
        .await
        .unwrap();

    let mut config = fast_detection();
    config.budget_ms = 300;
    let class = classify(&mut transcript, &config, &mut OperatorInput::none())
        .await
        .unwrap();
    assert_eq!(class, FaultClass::BashPrompt);
    assert_eq!(received(&mut far).await, b"\r");
}

#[tokio::test]
async fn test_operator_input_interrupts_and_is_forwarded() {
    let dir = TempDir::new().unwrap();
    let (mut transcript, mut far) = transcript(&dir);
    let (tx, mut operator) = OperatorInput::channel();
    tx.send(b"root\n".to_vec()).unwrap();

    let class = classify(&mut transcript, &fast_detection(), &mut operator)
        .await
        .unwrap();
    assert_eq!(class, FaultClass::UserInterrupted);
    assert_eq!(received(&mut far).await, b"root\n");
}

#[tokio::test]
async fn test_console_hangup_is_eof() {
    let dir = TempDir::new().unwrap();
    let (mut transcript, mut far) = transcript(&dir);
    far.write_all(b"[    1.000] Booting Linux\r\n").await.unwrap();
    drop(far);

    let class = classify(&mut transcript, &fast_detection(), &mut OperatorInput::none())
        .await
        .unwrap();
    assert_eq!(class, FaultClass::Eof);
}

#[tokio::test]
async fn test_silence_exhausts_budget() {
    let dir = TempDir::new().unwrap();
    let (mut transcript, _far) = transcript(&dir);
    let mut config = fast_detection();
    config.budget_ms = 300;

    let started = std::time::Instant::now();
    let class = classify(&mut transcript, &config, &mut OperatorInput::none())
        .await
        .unwrap();
    assert_eq!(class, FaultClass::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_few_smmu_faults_then_quiet() {
    let dir = TempDir::new().unwrap();
    let (mut transcript, mut far) = transcript(&dir);
    far.write_all(b"arm-smmu: Unexpected global fault\r\narm-smmu: 12 callbacks suppressed\r\n")
        .await
        .unwrap();

    let class = classify(&mut transcript, &fast_detection(), &mut OperatorInput::none())
        .await
        .unwrap();
    assert_eq!(class, FaultClass::SmmuFault);
}

#[tokio::test]
async fn test_acr_failure_is_terminal() {
    let dir = TempDir::new().unwrap();
    let (mut transcript, mut far) = transcript(&dir);
    far.write_all(b"nvgpu: 17000000.gpu  gm20b: HS ucode boot failed, err -110\r\n")
        .await
        .unwrap();

    let class = classify(&mut transcript, &fast_detection(), &mut OperatorInput::none())
        .await
        .unwrap();
    assert_eq!(class, FaultClass::NvgpuAcrFail);
}

#[tokio::test]
async fn test_first_event_in_stream_wins() {
    let dir = TempDir::new().unwrap();
    let (mut transcript, mut far) = transcript(&dir);
    far.write_all(b"Kernel panic - not syncing\r\nubuntu@tegra-ubuntu:~$ ")
        .await
        .unwrap();

    let class = classify(&mut transcript, &fast_detection(), &mut OperatorInput::none())
        .await
        .unwrap();
    assert_eq!(class, FaultClass::Panic);

    let log = std::fs::read_to_string(dir.path().join("uart-raw.log")).unwrap();
    assert!(log.contains("Kernel panic"));
}

#[tokio::test]
async fn test_pass_through_until_ctrl_c() {
    let (near, mut far) = tokio::io::duplex(4096);
    let mut transcript = Transcript::new(Box::new(near), Tee::new());
    let (tx, mut operator) = OperatorInput::channel();
    tx.send(b"dmesg\r".to_vec()).unwrap();
    tx.send(b"x\x03ignored".to_vec()).unwrap();
    tx.send(b"left over".to_vec()).unwrap();

    autopilot::console::interactive::pass_through(&mut transcript, &mut operator, Some(b"u".to_vec()))
        .await
        .unwrap();

    let mut got = Vec::new();
    while let Ok(Ok(n)) =
        tokio::time::timeout(Duration::from_millis(50), far.read_buf(&mut got)).await
    {
        if n == 0 {
            break;
        }
    }
    assert_eq!(got, b"udmesg\rx");
    // Input queued behind Ctrl+C is discarded
    assert!(operator.try_take().is_none());
}
