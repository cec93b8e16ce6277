use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lazy_static::lazy_static;
use regex::Regex;
use search_core::persist::{load_snapshot, save_meta, save_users, MetaFile, SnapshotPaths, SNAPSHOT_VERSION};
use search_core::{build_index, search_directory, Role, SearchableRecord, UserId};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

lazy_static! {
    static ref PASSING_YEAR: Regex = Regex::new(r"Passing Year\s+(\d{4})").expect("valid regex");
}

/// A user as exported by the directory store.
#[derive(Debug, Deserialize)]
struct InputUser {
    id: UserId,
    username: String,
    role: String,
    #[serde(default)]
    batch_year: Option<i32>,
    #[serde(default)]
    skills: Option<String>,
    /// e.g. "CSE (Passing Year 2023)"; used when batch_year is missing
    #[serde(default)]
    education: Option<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Import user directory exports and query them with the profile search engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import users from JSON/JSONL files or a directory into a snapshot
    Import {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output snapshot directory
        #[arg(long)]
        output: String,
    },
    /// Run a search against a snapshot
    Query {
        #[arg(long)]
        snapshot: String,
        /// Query text
        #[arg(long)]
        q: String,
        /// Maximum number of hits to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print vocabulary statistics for a snapshot
    Stats {
        #[arg(long)]
        snapshot: String,
        /// Number of tokens with the longest posting lists to show
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Serialize)]
struct QueryHit<'a> {
    id: UserId,
    username: &'a str,
    role: Role,
    score: u32,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import { input, output } => import(&input, &output),
        Commands::Query { snapshot, q, limit } => query(&snapshot, &q, limit),
        Commands::Stats { snapshot, top } => stats(&snapshot, top),
    }
}

fn import(input: &str, output: &str) -> Result<()> {
    let files = collect_input_files(Path::new(input));
    if files.is_empty() {
        tracing::warn!(input, "no .json or .jsonl files found");
    }

    let mut importer = Importer::default();
    for file in files {
        let users = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file)?
        } else {
            read_json(&file)?
        };
        tracing::debug!(file = %file.display(), users = users.len(), "read input file");
        for user in users {
            importer.ingest(user);
        }
    }

    let out_paths = SnapshotPaths::new(output);
    save_users(&out_paths, &importer.records)?;
    let meta = MetaFile {
        num_users: importer.records.len() as u32,
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: SNAPSHOT_VERSION,
    };
    save_meta(&out_paths, &meta)?;

    tracing::info!(output, users = importer.records.len(), skipped = importer.skipped, "snapshot written");
    Ok(())
}

fn query(snapshot: &str, q: &str, limit: usize) -> Result<()> {
    let (users, _meta) = load_snapshot(&SnapshotPaths::new(snapshot))?;
    let by_id: HashMap<UserId, &SearchableRecord> = users.iter().map(|u| (u.id, u)).collect();
    let ranked = search_directory(q, &users);
    tracing::info!(query = q, total_hits = ranked.len(), "search complete");
    for (id, score) in ranked.into_iter().take(limit) {
        if let Some(user) = by_id.get(&id) {
            let hit = QueryHit { id, username: &user.username, role: user.role, score };
            println!("{}", serde_json::to_string(&hit)?);
        }
    }
    Ok(())
}

fn stats(snapshot: &str, top: usize) -> Result<()> {
    let (users, meta) = load_snapshot(&SnapshotPaths::new(snapshot))?;
    let index = build_index(&users);
    let mut terms: Vec<(&str, usize)> = index.iter().map(|(t, p)| (t, p.len())).collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    println!("snapshot created: {}", meta.created_at);
    println!("users: {}", users.len());
    println!("vocabulary: {}", index.len());
    for (term, n) in terms.into_iter().take(top) {
        println!("{n:>8}  {term}");
    }
    Ok(())
}

fn collect_input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn read_jsonl(file: &Path) -> Result<Vec<InputUser>> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    let mut users = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let user: InputUser = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), n + 1))?;
        users.push(user);
    }
    Ok(users)
}

fn read_json(file: &Path) -> Result<Vec<InputUser>> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)
        .with_context(|| format!("parsing {}", file.display()))?;
    let users = match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<InputUser>, _>>()?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    };
    Ok(users)
}

/// Accumulates imported users in input order.
#[derive(Default)]
struct Importer {
    records: Vec<SearchableRecord>,
    seen_ids: HashSet<UserId>,
    usernames: HashSet<String>,
    skipped: usize,
}

impl Importer {
    fn ingest(&mut self, user: InputUser) {
        let role: Role = match user.role.parse() {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!(id = user.id, %err, "skipping user");
                self.skipped += 1;
                return;
            }
        };
        if !self.seen_ids.insert(user.id) {
            tracing::warn!(id = user.id, "duplicate user id, keeping first");
            self.skipped += 1;
            return;
        }
        let batch_year = user
            .batch_year
            .or_else(|| user.education.as_deref().and_then(passing_year));
        let username = self.unique_username(user.username);
        self.records.push(SearchableRecord { id: user.id, username, role, batch_year, skills: user.skills });
    }

    fn unique_username(&mut self, name: String) -> String {
        let mut candidate = name.clone();
        let mut counter = 1;
        while self.usernames.contains(&candidate) {
            candidate = format!("{name}_{counter}");
            counter += 1;
        }
        self.usernames.insert(candidate.clone());
        candidate
    }
}

/// Extract the graduation year from e.g. "CSE (Passing Year 2023)".
fn passing_year(education: &str) -> Option<i32> {
    PASSING_YEAR.captures(education)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn input(id: UserId, username: &str, role: &str) -> InputUser {
        InputUser { id, username: username.into(), role: role.into(), batch_year: None, skills: None, education: None }
    }

    #[test]
    fn extracts_passing_year() {
        assert_eq!(passing_year("CSE (Passing Year 2023)"), Some(2023));
        assert_eq!(passing_year("ECE, 2019"), None);
    }

    #[test]
    fn explicit_batch_year_wins_over_education() {
        let mut imp = Importer::default();
        let mut user = input(1, "ada", "alumni");
        user.batch_year = Some(2018);
        user.education = Some("CSE (Passing Year 2023)".into());
        imp.ingest(user);
        assert_eq!(imp.records[0].batch_year, Some(2018));
    }

    #[test]
    fn duplicate_usernames_get_suffixes() {
        let mut imp = Importer::default();
        imp.ingest(input(1, "Ada", "alumni"));
        imp.ingest(input(2, "Ada", "student"));
        imp.ingest(input(3, "Ada", "faculty"));
        let names: Vec<&str> = imp.records.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Ada_1", "Ada_2"]);
    }

    #[test]
    fn skips_bad_roles_and_duplicate_ids() {
        let mut imp = Importer::default();
        imp.ingest(input(1, "a", "alumni"));
        imp.ingest(input(1, "b", "student"));
        imp.ingest(input(2, "c", "teacher"));
        assert_eq!(imp.records.len(), 1);
        assert_eq!(imp.skipped, 2);
    }

    #[test]
    fn import_then_load_snapshot() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("a.jsonl"),
            "{\"id\":1,\"username\":\"ada\",\"role\":\"alumni\",\"skills\":\"python\",\"education\":\"CSE (Passing Year 2020)\"}\n\n",
        )
        .unwrap();
        fs::write(src.join("b.json"), r#"[{"id":2,"username":"bob","role":"Student"}]"#).unwrap();
        let out = dir.path().join("snap");

        import(src.to_str().unwrap(), out.to_str().unwrap()).unwrap();

        let (users, meta) = load_snapshot(&SnapshotPaths::new(&out)).unwrap();
        assert_eq!(meta.num_users, 2);
        assert_eq!(users[0].batch_year, Some(2020));
        assert_eq!(users[1].role, Role::Student);
        assert_eq!(search_directory("2020", &users), vec![(1, 3)]);
    }
}
