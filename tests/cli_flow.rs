use serde_json::Value;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "jar_indexer_cli_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_jar(path: &Path, entries: &[(&str, &str)]) -> anyhow::Result<()> {
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

fn run_json(home: &Path, args: &[&str]) -> anyhow::Result<Value> {
    let out = Command::new(env!("CARGO_BIN_EXE_jar-indexer"))
        .arg("--home")
        .arg(home)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()?;
    anyhow::ensure!(
        out.status.success(),
        "jar-indexer {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(serde_json::from_slice(&out.stdout)?)
}

#[test]
fn register_index_list_and_read() -> anyhow::Result<()> {
    let base = temp_dir("flow");
    let home = base.join("home");
    let jar = base.join("demo-sources.jar");
    write_jar(
        &jar,
        &[
            ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
            ("org/demo/Hello.java", "package org.demo;\n\nclass Hello {}\n"),
        ],
    )?;
    let uri = format!("file://{}", jar.display());

    let reg = run_json(&home, &["register", "org.demo", "demo", "0.1.0", &uri])?;
    assert_eq!(reg["status"], "registered_only");
    assert_eq!(reg["indexed"], false);

    let idx = run_json(&home, &["index", "org.demo", "demo", "0.1.0"])?;
    assert_eq!(idx["status"], "source-jar,file-searchable");

    let list = run_json(&home, &["list", "--status", "source-jar"])?;
    assert_eq!(list["status"], "success");
    assert_eq!(list["artifacts"][0]["version"], "0.1.0");
    assert_eq!(list["artifacts"][0]["status"], "source-jar,file-searchable");

    let file = run_json(
        &home,
        &["get", "org.demo", "demo", "0.1.0", "org/demo/Hello.java", "--start", "3"],
    )?;
    assert_eq!(file["status"], "success");
    assert_eq!(file["content"]["source_code"], "class Hello {}\n");

    let grep = run_json(&home, &["grep", "org.demo", "demo", "0.1.0", "Hello", "-B", "0", "-A", "0"])?;
    assert_eq!(grep["matches"]["org/demo/Hello.java"][0]["match_lines"], "3");

    // Failures are reported in the JSON body, not through the exit code.
    let missing = run_json(&home, &["index", "org.demo", "demo", "0.2.0"])?;
    assert_eq!(missing["status"], "not_registered");

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn serve_answers_over_stdio() -> anyhow::Result<()> {
    let base = temp_dir("serve");
    let mut child = Command::new(env!("CARGO_BIN_EXE_jar-indexer"))
        .arg("--home")
        .arg(base.join("home"))
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    {
        let mut stdin = child.stdin.take().ok_or_else(|| anyhow::anyhow!("no stdin"))?;
        writeln!(stdin, r#"{{"jsonrpc":"2.0","id":1,"method":"initialize","params":{{}}}}"#)?;
        writeln!(stdin, r#"{{"jsonrpc":"2.0","id":2,"method":"tools/list"}}"#)?;
    }
    let out = child.wait_with_output()?;
    assert!(out.status.success());

    let replies: Vec<Value> = String::from_utf8(out.stdout)?
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "jar-indexer");
    assert_eq!(replies[1]["result"]["tools"].as_array().map(Vec::len), Some(8));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
