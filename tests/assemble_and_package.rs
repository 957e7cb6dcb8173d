use std::fs;
use std::path::PathBuf;

use beebasm_rs::basic::{detokenise, tokenise};
use beebasm_rs::cli::{run, Cli};
use beebasm_rs::disc::DiscImage;

fn cli(inputs: Vec<PathBuf>) -> Cli {
    Cli {
        inputs,
        object_output: None,
        disc_output: None,
        disc_title: String::new(),
        boot_file: None,
        disc_opt: 0,
        verbose: 0,
        defines: Vec::new(),
        dump_json: None,
    }
}

#[test]
fn assembles_a_small_program_to_a_raw_object_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.asm");
    fs::write(
        &source,
        "ORG &2000\n.start\nLDA #&41\nSTA &FE20\nBNE start\nSAVE \"CODE\", start, P%\n",
    )
    .unwrap();

    let output = dir.path().join("prog.bin");
    let mut c = cli(vec![source]);
    c.object_output = Some(output.clone());

    let code = run(&c).unwrap();
    assert_eq!(code, 0);

    let bytes = fs::read(&output).unwrap();
    // LDA #&41 (2 bytes) + STA &FE20 absolute (3 bytes) + BNE start,
    // branching back to &2000 from a PC of &2007 after the branch: a
    // displacement of -7 (0xF9).
    assert_eq!(bytes, vec![0xA9, 0x41, 0x8D, 0x20, 0xFE, 0xD0, 0xF9]);
}

#[test]
fn reports_failure_exit_code_for_undefined_symbol_on_pass_two() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bad.asm");
    fs::write(&source, "ORG &2000\nLDA neverdefined\n").unwrap();

    let c = cli(vec![source]);
    let code = run(&c).unwrap();
    assert_eq!(code, 1);
}

#[test]
fn packages_a_save_region_into_a_dfs_disc_image() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.asm");
    fs::write(
        &source,
        "ORG &1900\nEQUB &00, &01, &02, &03\nSAVE \"CODE\", &1900, &1904\n",
    )
    .unwrap();

    let disc_path = dir.path().join("out.ssd");
    let mut c = cli(vec![source]);
    c.disc_title = "DEMO".to_string();
    c.disc_output = Some(disc_path.clone());

    assert_eq!(run(&c).unwrap(), 0);

    let disc = DiscImage::load(&disc_path).unwrap();
    let cat = disc.catalogue();
    assert_eq!(cat.len(), 1);
    assert_eq!(cat[0].name, "CODE");
    assert_eq!(cat[0].load, 0x1900);
    assert_eq!(cat[0].length, 4);
}

#[test]
fn tokenised_program_detokenises_back_to_its_source_layout() {
    let source = "10 PRINT \"HELLO\"\n20 FOR I%=1 TO 10\n30 NEXT\n40 END\n";
    let tokens = tokenise(source).unwrap();

    let mut image = vec![0u8; 0x8000];
    image[..tokens.len()].copy_from_slice(&tokens);
    let text = detokenise(&image).unwrap();

    assert!(text.contains("PRINT \"HELLO\""));
    assert!(text.contains("FOR I%=1 TO 10"));
    assert!(text.contains("NEXT"));
    assert!(text.contains("END"));
}

#[test]
fn command_line_define_feeds_an_expression_in_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.asm");
    fs::write(&source, "ORG &2000\nEQUB VERSION\n").unwrap();

    let output = dir.path().join("prog.bin");
    let mut c = cli(vec![source]);
    c.object_output = Some(output.clone());
    c.defines = vec!["VERSION=42".to_string()];

    assert_eq!(run(&c).unwrap(), 0);
    assert_eq!(fs::read(&output).unwrap(), vec![42]);
}

#[test]
fn dump_json_writes_label_symbols_as_real_json() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.asm");
    fs::write(&source, "ORG &2000\n.start\nLDA #0\n.finish\nRTS\n").unwrap();

    let json_path = dir.path().join("symbols.json");
    let mut c = cli(vec![source]);
    c.dump_json = Some(json_path.clone());

    assert_eq!(run(&c).unwrap(), 0);

    let text = fs::read_to_string(&json_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entries = value.as_array().unwrap();
    let start = entries.iter().find(|e| e["name"] == "start").unwrap();
    assert_eq!(start["value"], 0x2000);
    assert_eq!(start["is_label"], true);
    let finish = entries.iter().find(|e| e["name"] == "finish").unwrap();
    assert_eq!(finish["value"], 0x2002);
}
