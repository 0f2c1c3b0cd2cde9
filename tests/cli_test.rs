use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("escrow-workflow"));
    cmd.arg("tests/fixtures/scenario.json");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "shop,order,service_status,sequence,amount,status,payment_ref",
        ))
        // Order 1001 walked through approval and final payment
        .stdout(predicate::str::contains("demo.example.com,1001,Completed,0,60.00,paid,\n"))
        .stdout(predicate::str::contains(
            "demo.example.com,1001,Completed,1,60.00,paid,gid://platform/DraftOrder/1",
        ))
        .stdout(predicate::str::contains(
            "demo.example.com,1001,Completed,2,80.00,paid,gid://platform/DraftOrder/2",
        ))
        // Order 1002: delivered twice, final still gated, middle paid by override
        .stdout(predicate::str::contains("demo.example.com,1002,Booked,1,30.00,paid,\n"))
        .stdout(predicate::str::contains("demo.example.com,1002,Booked,2,40.00,locked,\n"))
        .stderr(predicate::str::contains("Error processing step 12: Conflict: milestone is locked"));

    Ok(())
}

#[test]
fn test_cli_missing_input_fails() {
    let mut cmd = Command::new(cargo_bin!("escrow-workflow"));
    cmd.arg("tests/fixtures/does_not_exist.json");

    cmd.assert().failure();
}

#[test]
fn test_cli_scale_from_environment() {
    let mut cmd = Command::new(cargo_bin!("escrow-workflow"));
    cmd.arg("tests/fixtures/scenario.json")
        .env("ESCROW_CURRENCY_SCALE", "0");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("demo.example.com,1001,Completed,0,60,paid,\n"));
}
