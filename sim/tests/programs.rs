// Whole programs through the assembler, the machine code codec and the simulator

use std::process::Command;

use anyhow::{ensure, Result};
use stack_sim::{
    assemble, input_queue, simulate, simulate_traced, AssembleOption, Fault, Image, Instruction,
    RuntimeFault, SimOption, StopReason,
};

const HELLO: &str = r#"
section .data:
    str greeting "Hello, World!"
section .code:
    psh greeting
print:
    dup
    get
    jmz end
    out
    inc
    jmp print
end:
    hlt
"#;

const CAT: &str = r#"
section .code:
loop:
    inp
    jmz end
    out
    jmp loop
end:
    hlt
"#;

/// Reads input without looking for the terminating NUL.
const GREEDY: &str = r#"
section .code:
loop:
    inp
    out
    jmp loop
"#;

/// Sum of the digits typed, printed as a number.
const SUM: &str = r#"
section .data:
    num acc 0
    buf scratch 2
section .code:
loop:
    psh acc
    inp
    jmz end
    psh -48
    add         ; digit value
    psh acc
    get
    add
    pop         ; acc = acc + digit
    jmp loop
end:
    drp
    get
    out
    hlt
"#;

fn image(src: &str) -> Result<Image> {
    Ok(assemble(src, AssembleOption::default())?.image)
}

#[test]
fn test_hello() -> Result<()> {
    let report = simulate(&image(HELLO)?, input_queue(None), &SimOption::default())?;
    ensure!(report.text() == "Hello, World!");
    ensure!(report.stop == StopReason::Halted);
    Ok(())
}

#[test]
fn test_cat() -> Result<()> {
    let report = simulate(&image(CAT)?, input_queue(Some("foo bar\n")), &SimOption::default())?;
    ensure!(report.text() == "foo bar\n");
    ensure!(report.stop == StopReason::Halted);
    // 8 chars echoed, each: inp (3 + 3), jmz 2, out (4 + 3), jmp 2
    ensure!(report.ticks == 8 * 17 + 3 + 3 + 2 + 1);
    ensure!(report.instructions == 8 * 6 + 4);
    Ok(())
}

#[test]
fn test_cat_latin1() -> Result<()> {
    let report = simulate(&image(CAT)?, input_queue(Some("café ±")), &SimOption::default())?;
    ensure!(report.text() == "café ±", "got {:?}", report.text());
    ensure!(report.output == vec![99, 97, 102, 233, 32, 177]);
    Ok(())
}

#[test]
fn test_add_and_print() -> Result<()> {
    let src = "section .code:\npsh 3\npsh 4\nadd\nout\nhlt\n";
    let report = simulate(&image(src)?, input_queue(None), &SimOption::default())?;
    ensure!(report.text() == "7");
    ensure!(report.instructions == 6);
    ensure!(report.ticks == 3 + 3 + 2 + (4 + 3) + 1);
    Ok(())
}

#[test]
fn test_input_exhausted_keeps_output() -> Result<()> {
    let report = simulate(&image(GREEDY)?, input_queue(Some("ab")), &SimOption::default())?;
    ensure!(report.stop == StopReason::InputExhausted);
    ensure!(report.output == vec!['a' as i32, 'b' as i32, 0]);
    ensure!(report.text() == "ab0");
    Ok(())
}

#[test]
fn test_tick_ceiling() -> Result<()> {
    let src = "section .code:\nloop:\njmp loop\n";
    let option = SimOption::default().set_tick_limit(1000);
    let report = simulate(&image(src)?, input_queue(None), &option)?;
    ensure!(report.stop == StopReason::TickLimitExceeded);
    ensure!(report.ticks == 1000);
    ensure!(report.instructions == 500);
    ensure!(report.output.is_empty());
    Ok(())
}

#[test]
fn test_memory_store() -> Result<()> {
    let report = simulate(&image(SUM)?, input_queue(Some("12345")), &SimOption::default())?;
    ensure!(report.output == vec![15], "got {:?}", report.output);
    ensure!(report.text() == "15");
    Ok(())
}

#[test]
fn test_deterministic_trace() -> Result<()> {
    let img = image(HELLO)?;
    let option = SimOption::default().set_debug_limit(50);
    let trace = || -> Result<_> {
        let mut lines = Vec::new();
        let report = simulate_traced(&img, input_queue(None), &option, |s| {
            lines.push(s.to_string())
        })?;
        Ok((report, lines))
    };
    let (first, lines) = trace()?;
    ensure!((first.clone(), lines.clone()) == trace()?);
    ensure!(lines.iter().all(|l| l.starts_with("TICK:")));
    ensure!(lines[0] == "TICK:    3 PUSH       PC:   1 DA:   0 SP:  0 TOS:   2 Stack: [2, -1, -1, -1, -1]");
    Ok(())
}

#[test]
fn test_faults_abort() -> Result<()> {
    let overflow = "section .code:\nloop:\npsh 1\njmp loop\n";
    let err = simulate(&image(overflow)?, input_queue(None), &SimOption::default().set_stack_size(3))
        .unwrap_err();
    ensure!(err == Fault::Runtime(RuntimeFault::StackOverflow(3)));

    let underflow = "section .code:\nadd\nhlt\n";
    let err = simulate(&image(underflow)?, input_queue(None), &SimOption::default()).unwrap_err();
    ensure!(err == Fault::Runtime(RuntimeFault::StackUnderflow));

    let wild_load = "section .code:\npsh 100\nget\nhlt\n";
    let err = simulate(&image(wild_load)?, input_queue(None), &SimOption::default()).unwrap_err();
    ensure!(err == Fault::Runtime(RuntimeFault::BadAddress(100)));

    let no_halt = "section .code:\npsh 1\n";
    let err = simulate(&image(no_halt)?, input_queue(None), &SimOption::default()).unwrap_err();
    ensure!(err == Fault::Runtime(RuntimeFault::PcOutOfRange(1)));

    let declarative = Image {
        data: vec![0, 0],
        code: vec![Instruction::new(0, stack_sim::isa::Opcode::NUMBER, Some(1))],
    };
    let err = simulate(&declarative, input_queue(None), &SimOption::default()).unwrap_err();
    ensure!(matches!(err, Fault::Decode { index: 0, .. }));
    Ok(())
}

#[test]
fn test_image_file_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cat.o");
    let img = image(CAT)?;
    std::fs::write(&path, img.to_string())?;
    let loaded = Image::load(&path)?;
    ensure!(loaded == img);

    std::fs::write(&path, "[2, 0, 0, {\"index\": 0, \"opcode\": \"nop\", \"arg\": null}]")?;
    ensure!(Image::load(&path).is_err());
    Ok(())
}

#[test]
fn test_cli() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("cat.asm");
    let input = dir.path().join("input.txt");
    std::fs::write(&source, CAT)?;
    std::fs::write(&input, "meow")?;

    let out = Command::new(env!("CARGO_BIN_EXE_sas"))
        .arg(&source)
        .output()?;
    ensure!(out.status.success(), "sas failed: {}", String::from_utf8_lossy(&out.stderr));
    ensure!(String::from_utf8(out.stdout)? == "LoC: 10 Code instr: 7\n");
    let target = dir.path().join("cat.o");
    ensure!(Image::load(&target)? == image(CAT)?);

    let out = Command::new(env!("CARGO_BIN_EXE_ssim"))
        .arg(&target)
        .arg(&input)
        .output()?;
    ensure!(out.status.success(), "ssim failed: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout)?;
    ensure!(stdout.starts_with("meow\nInstructions: 28 Ticks: "), "got {stdout:?}");

    let out = Command::new(env!("CARGO_BIN_EXE_ssim"))
        .arg(&source)
        .arg("--asm")
        .arg("--stack-size")
        .arg("0")
        .output()?;
    ensure!(!out.status.success());
    Ok(())
}
