use clap::{Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

const DEFAULT_CONFIG_YAML: &str = include_str!("../config/default.yaml");
const DESKTOP_SUFFIX: &str = ".desktop";
const WM_NAME_ENV: &str = "WMPREFS_WM_NAME";

#[derive(Parser, Debug)]
#[command(name = "wmprefs", version, about = "Window manager preferences CLI")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    display: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    List,
    Current,
    Configure,
    Select {
        name: Option<String>,
        #[arg(long, default_value_t = false)]
        launch: bool,
    },
    Show {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Validate,
}

#[derive(Debug, Error)]
enum PrefsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("desktop entry error: {0}")]
    Entry(String),
    #[error("no window manager identified on the active screen")]
    NoCurrentWm,
    #[error("window manager \"{0}\" has not registered a configuration tool")]
    NoConfigTool(String),
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Process(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
struct Config {
    version: u32,
    paths: Paths,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
struct Paths {
    system_dir: String,
    user_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            paths: Paths::default(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            system_dir: "/usr/share/wm-properties".to_string(),
            user_dir: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct Context {
    config_path: PathBuf,
    json: bool,
    display: Option<String>,
}

/// One validated window manager candidate. Immutable once loaded; owned by
/// the registry for the rest of the process.
#[derive(Debug, Clone, Serialize)]
struct WindowManager {
    name: String,
    identify_name: Option<String>,
    exec: String,
    try_exec: Option<String>,
    config_exec: Option<String>,
    config_try_exec: Option<String>,
    settings_module: Option<String>,
    session_managed: bool,
    user_installed: bool,
    present: bool,
    config_present: bool,
    source: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
struct SettingsModule {
    module: String,
    wm_name: String,
    source: PathBuf,
}

trait ProgramProbe {
    fn find_program(&self, program: &str) -> bool;
}

struct RealProgramProbe;

impl ProgramProbe for RealProgramProbe {
    fn find_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

trait ScreenQuery {
    fn window_manager_name(&self) -> Option<String>;
}

/// Asks the running window manager to identify itself via `wmctrl -m`.
/// Any failure here means "no current window manager", never an error.
struct WmctrlScreenQuery {
    display: Option<String>,
}

impl ScreenQuery for WmctrlScreenQuery {
    fn window_manager_name(&self) -> Option<String> {
        if let Ok(name) = env::var(WM_NAME_ENV) {
            let name = name.trim().to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
        let mut cmd = Command::new("wmctrl");
        cmd.arg("-m");
        if let Some(display) = &self.display {
            cmd.env("DISPLAY", display);
        }
        let output = match cmd.output() {
            Ok(output) => output,
            Err(err) => {
                eprintln!("wmctrl probe failed: {err}");
                return None;
            }
        };
        if !output.status.success() {
            eprintln!("wmctrl probe exited with {}", output.status);
            return None;
        }
        parse_wmctrl_name(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_wmctrl_name(output: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(value) = line.strip_prefix("Name:") {
            let value = value.trim();
            if !value.is_empty() && value != "N/A" {
                return Some(value.to_string());
            }
        }
    }
    None
}

trait Spawner {
    fn spawn_command_line(&self, command_line: &str) -> Result<(), PrefsError>;
}

/// Spawns a command line detached from the caller; the child is never
/// waited on and only the spawn result is reported.
struct DetachedSpawner;

impl Spawner for DetachedSpawner {
    fn spawn_command_line(&self, command_line: &str) -> Result<(), PrefsError> {
        let argv = shell_parse_argv(command_line)?;
        let Some((program, args)) = argv.split_first() else {
            return Err(PrefsError::Process(format!(
                "empty command line: {command_line:?}"
            )));
        };
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|source| PrefsError::Spawn {
                command: command_line.to_string(),
                source,
            })
    }
}

fn shell_parse_argv(command_line: &str) -> Result<Vec<String>, PrefsError> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command_line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if in_word {
                    argv.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => {
                            return Err(PrefsError::Process(format!(
                                "unterminated single quote in {command_line:?}"
                            )))
                        }
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => {
                                return Err(PrefsError::Process(format!(
                                    "unterminated double quote in {command_line:?}"
                                )))
                            }
                        },
                        Some(c) => current.push(c),
                        None => {
                            return Err(PrefsError::Process(format!(
                                "unterminated double quote in {command_line:?}"
                            )))
                        }
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => {
                        return Err(PrefsError::Process(format!(
                            "trailing backslash in {command_line:?}"
                        )))
                    }
                }
            }
            _ => {
                in_word = true;
                current.push(ch);
            }
        }
    }
    if in_word {
        argv.push(current);
    }
    Ok(argv)
}

/// Parsed `[Desktop Entry]` section of one desktop-entry file.
#[derive(Debug, Clone, Default)]
struct DesktopEntry {
    keys: BTreeMap<String, String>,
    // key -> locale -> value, from `Key[locale]=` lines
    locale_keys: BTreeMap<String, BTreeMap<String, String>>,
}

impl DesktopEntry {
    fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    fn get_nonempty(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(value) if value.eq_ignore_ascii_case("true") || value == "1")
    }

    /// Looks up a vendor-prefixed key of the form `X-<vendor>-<suffix>`,
    /// whatever the vendor.
    fn vendor_key(&self, suffix: &str) -> Option<&str> {
        self.keys.iter().find_map(|(key, value)| {
            let middle = key.strip_prefix("X-")?.strip_suffix(suffix)?;
            if middle.len() > 1 && middle.ends_with('-') {
                Some(value.as_str())
            } else {
                None
            }
        })
    }

    fn localized(&self, key: &str, locales: &[String]) -> Option<&str> {
        if let Some(by_locale) = self.locale_keys.get(key) {
            for locale in locales {
                if let Some(value) = by_locale.get(locale) {
                    return Some(value);
                }
            }
        }
        self.get(key)
    }
}

fn parse_desktop_entry(content: &str) -> Result<DesktopEntry, PrefsError> {
    let mut entry = DesktopEntry::default();
    let mut in_entry = false;
    let mut seen_entry = false;
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            seen_entry = seen_entry || in_entry;
            continue;
        }
        if !in_entry {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(PrefsError::Entry(format!(
                "line {}: missing '='",
                index + 1
            )));
        };
        let key = key.trim_end();
        let value = value.trim_start().to_string();
        if let Some(base) = key.strip_suffix(']').and_then(|k| k.split_once('[')) {
            let (base_key, locale) = base;
            entry
                .locale_keys
                .entry(base_key.to_string())
                .or_default()
                .entry(locale.to_string())
                .or_insert(value);
        } else {
            entry.keys.entry(key.to_string()).or_insert(value);
        }
    }
    if !seen_entry {
        return Err(PrefsError::Entry(
            "missing [Desktop Entry] section".to_string(),
        ));
    }
    Ok(entry)
}

/// Locale candidates for localized keys, most specific first:
/// `ll_CC` then `ll`, from LC_ALL / LC_MESSAGES / LANG.
fn message_locales() -> Vec<String> {
    let raw = env::var("LC_ALL")
        .or_else(|_| env::var("LC_MESSAGES"))
        .or_else(|_| env::var("LANG"))
        .unwrap_or_default();
    let base = raw.split(['.', '@']).next().unwrap_or_default();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return Vec::new();
    }
    let mut locales = vec![base.to_string()];
    if let Some((lang, _)) = base.split_once('_') {
        locales.push(lang.to_string());
    }
    locales
}

fn probe_command_present(command: &str, probe: &dyn ProgramProbe) -> bool {
    match command.split_whitespace().next() {
        Some(program) => probe.find_program(program),
        None => false,
    }
}

fn window_manager_from_entry(
    entry: &DesktopEntry,
    source: &Path,
    user_installed: bool,
    probe: &dyn ProgramProbe,
) -> WindowManager {
    let locales = message_locales();
    let name = entry
        .localized("Name", &locales)
        .unwrap_or_default()
        .to_string();
    let exec = entry.get("Exec").unwrap_or_default().to_string();
    let try_exec = entry.get_nonempty("TryExec");
    let config_exec = entry.get_nonempty("ConfigExec");
    let config_try_exec = entry.get_nonempty("ConfigTryExec");
    let identify_name = entry.vendor_key("WMName").map(str::to_string);
    let settings_module = entry.vendor_key("WMSettingsModule").map(str::to_string);

    let present = !exec.is_empty()
        && probe_command_present(try_exec.as_deref().unwrap_or(&exec), probe);
    let config_present = match &config_exec {
        Some(config_exec) => {
            probe_command_present(config_try_exec.as_deref().unwrap_or(config_exec), probe)
        }
        None => false,
    };

    WindowManager {
        name,
        identify_name,
        exec,
        try_exec,
        config_exec,
        config_try_exec,
        settings_module,
        session_managed: entry.get_bool("SessionManaged"),
        user_installed,
        present,
        config_present,
        source: source.to_path_buf(),
    }
}

fn retained(wm: &WindowManager) -> bool {
    !wm.name.is_empty() && !wm.exec.is_empty() && (wm.user_installed || wm.present)
}

/// Loads one desktop-entry file into a candidate, or nothing. Unparseable
/// files and candidates failing the retention rule are skipped, never
/// surfaced as errors.
fn load_window_manager(
    path: &Path,
    user_installed: bool,
    probe: &dyn ProgramProbe,
) -> Option<WindowManager> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("skipping {}: {err}", path.display());
            return None;
        }
    };
    let entry = match parse_desktop_entry(&content) {
        Ok(entry) => entry,
        Err(err) => {
            eprintln!("skipping {}: {err}", path.display());
            return None;
        }
    };
    let wm = window_manager_from_entry(&entry, path, user_installed, probe);
    if retained(&wm) {
        Some(wm)
    } else {
        None
    }
}

fn list_desktop_files(directory: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("could not read {}: {err}", directory.display());
            return Vec::new();
        }
    };
    let mut result = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        // A bare ".desktop" with no prefix does not count.
        if name.len() > DESKTOP_SUFFIX.len() && name.ends_with(DESKTOP_SUFFIX) {
            result.push(entry.path());
        }
    }
    result
}

fn collation_key(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Clone)]
struct RegistryPaths {
    system_dir: PathBuf,
    user_dir: PathBuf,
}

/// Ordered collection of available window managers. `build` scans the
/// system directory then the per-user directory exactly once; the registry
/// is frozen afterwards.
#[derive(Debug, Default)]
struct WmRegistry {
    window_managers: Vec<WindowManager>,
    scanned: bool,
    scan_count: u32,
}

impl WmRegistry {
    fn new() -> Self {
        Self::default()
    }

    fn build(&mut self, paths: &RegistryPaths, probe: &dyn ProgramProbe) {
        if self.scanned {
            return;
        }
        self.scanned = true;
        self.scan_count += 1;
        self.scan_directory(&paths.system_dir, false, probe);
        self.scan_directory(&paths.user_dir, true, probe);
        // Stable sort: equal collation keys keep encounter order.
        self.window_managers
            .sort_by(|a, b| collation_key(&a.name).cmp(&collation_key(&b.name)));
    }

    fn scan_directory(&mut self, directory: &Path, user_installed: bool, probe: &dyn ProgramProbe) {
        for file in list_desktop_files(directory) {
            if let Some(wm) = load_window_manager(&file, user_installed, probe) {
                self.window_managers.push(wm);
            }
        }
    }

    fn window_managers(&self) -> &[WindowManager] {
        &self.window_managers
    }

    fn find_by_name(&self, name: &str) -> Option<&WindowManager> {
        self.window_managers.iter().find(|wm| wm.name == name)
    }

    /// Matches the screen-reported name against the registry: a full pass
    /// over the identify names first, then a pass over display names as a
    /// back-compat fallback for window managers that never set a dedicated
    /// identifier. First match wins in both passes.
    fn find_current(&self, reported: &str) -> Option<&WindowManager> {
        self.window_managers
            .iter()
            .find(|wm| wm.identify_name.as_deref() == Some(reported))
            .or_else(|| self.find_by_name(reported))
    }

    /// A known window manager without a settings module yields `None` here;
    /// that is different from the window manager being unknown.
    fn settings_module(&self, reported: &str) -> Option<SettingsModule> {
        let wm = self.find_current(reported)?;
        let module = wm.settings_module.as_deref().unwrap_or_default().trim();
        if module.is_empty() {
            return None;
        }
        Some(SettingsModule {
            module: module.to_string(),
            wm_name: wm.name.clone(),
            source: wm.source.clone(),
        })
    }
}

/// Resolves the current window manager and fires its configuration tool,
/// detached. Returns the spawned command line.
fn spawn_config_tool(
    registry: &WmRegistry,
    query: &dyn ScreenQuery,
    spawner: &dyn Spawner,
) -> Result<String, PrefsError> {
    let reported = query.window_manager_name().ok_or(PrefsError::NoCurrentWm)?;
    let config_exec = registry
        .find_current(&reported)
        .and_then(|wm| wm.config_exec.clone());
    match config_exec {
        Some(command) => {
            spawner.spawn_command_line(&command)?;
            Ok(command)
        }
        None => Err(PrefsError::NoConfigTool(reported)),
    }
}

fn main() -> Result<(), PrefsError> {
    let cli = Cli::parse();
    let ctx = Context {
        config_path: resolve_config_path(cli.config.as_ref()),
        json: cli.json,
        display: cli.display.clone(),
    };

    let query = WmctrlScreenQuery {
        display: ctx.display.clone(),
    };
    let spawner = DetachedSpawner;

    let result = match cli.command {
        Commands::Config { command } => handle_config(&ctx, command),
        Commands::List => handle_list(&ctx),
        Commands::Current => handle_current(&ctx, &query),
        Commands::Configure => handle_configure(&ctx, &query, &spawner),
        Commands::Select { name, launch } => handle_select(&ctx, name, launch, &spawner),
        Commands::Show { id } => handle_show(&ctx, &id),
    };

    if let Err(err) = result {
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var("WMPREFS_CONFIG") {
        return PathBuf::from(path);
    }
    let mut base = default_config_dir();
    base.push("config.yaml");
    base
}

fn default_config_dir() -> PathBuf {
    if let Ok(path) = env::var("WMPREFS_CONFIG_DIR") {
        return PathBuf::from(path);
    }
    let mut base = home_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("wmprefs");
    base
}

fn config_dir_from_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map_or_else(default_config_dir, PathBuf::from)
}

fn expand_path(input: &str) -> String {
    if let Some(stripped) = input.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(stripped).to_string_lossy().to_string();
        }
    }
    input.to_string()
}

fn read_config_from_str(content: &str) -> Result<Config, PrefsError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    if cfg.version != 1 {
        return Err(PrefsError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

fn read_config(path: &Path) -> Result<Config, PrefsError> {
    let content = fs::read_to_string(path)?;
    read_config_from_str(&content)
}

/// Missing config file means defaults; a present but invalid one is an error.
fn read_config_or_default(path: &Path) -> Result<Config, PrefsError> {
    if path.exists() {
        read_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate_config(cfg: &Config) -> Result<(), PrefsError> {
    let system_dir = expand_path(cfg.paths.system_dir.trim());
    if system_dir.is_empty() {
        return Err(PrefsError::Config(
            "paths.system_dir must be non-empty".to_string(),
        ));
    }
    if !Path::new(&system_dir).is_absolute() {
        return Err(PrefsError::Config(format!(
            "paths.system_dir must be an absolute path: {system_dir}"
        )));
    }
    let user_dir = expand_path(cfg.paths.user_dir.trim());
    if !user_dir.is_empty() && !Path::new(&user_dir).is_absolute() {
        return Err(PrefsError::Config(format!(
            "paths.user_dir must be an absolute path: {user_dir}"
        )));
    }
    Ok(())
}

fn registry_paths(cfg: &Config, config_path: &Path) -> RegistryPaths {
    let system_dir = PathBuf::from(expand_path(cfg.paths.system_dir.trim()));
    let user_dir = cfg.paths.user_dir.trim();
    let user_dir = if user_dir.is_empty() {
        config_dir_from_path(config_path).join("wm-properties")
    } else {
        PathBuf::from(expand_path(user_dir))
    };
    RegistryPaths {
        system_dir,
        user_dir,
    }
}

fn build_registry(ctx: &Context) -> Result<WmRegistry, PrefsError> {
    let cfg = read_config_or_default(&ctx.config_path)?;
    let paths = registry_paths(&cfg, &ctx.config_path);
    let mut registry = WmRegistry::new();
    registry.build(&paths, &RealProgramProbe);
    Ok(registry)
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), PrefsError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}

fn print_ok<T: Serialize>(result: T) -> Result<(), PrefsError> {
    print_json(&JsonResult {
        ok: true,
        result: Some(result),
        error: None,
    })
}

fn ensure_parent(path: &Path) -> Result<(), PrefsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConfigInitResult {
    created: bool,
    path: String,
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<(), PrefsError> {
    match command {
        ConfigCommand::Init => {
            let created = if ctx.config_path.exists() {
                false
            } else {
                ensure_parent(&ctx.config_path)?;
                fs::write(&ctx.config_path, DEFAULT_CONFIG_YAML)?;
                true
            };
            if ctx.json {
                print_ok(ConfigInitResult {
                    created,
                    path: ctx.config_path.to_string_lossy().to_string(),
                })?;
            } else if created {
                println!("wrote {}", ctx.config_path.display());
            } else {
                println!("kept existing {}", ctx.config_path.display());
            }
            Ok(())
        }
        ConfigCommand::Validate => {
            let cfg = read_config(&ctx.config_path)?;
            if ctx.json {
                print_ok(&cfg)?;
            } else {
                println!("config ok: {}", ctx.config_path.display());
            }
            Ok(())
        }
    }
}

fn handle_list(ctx: &Context) -> Result<(), PrefsError> {
    let registry = build_registry(ctx)?;
    if ctx.json {
        return print_ok(registry.window_managers());
    }
    if registry.window_managers().is_empty() {
        println!("no window managers found");
        return Ok(());
    }
    for wm in registry.window_managers() {
        let mut flags = Vec::new();
        if wm.user_installed {
            flags.push("user");
        }
        if wm.config_exec.is_some() {
            flags.push("configurable");
        }
        if wm.session_managed {
            flags.push("session-managed");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!("  ({})", flags.join(", "))
        };
        println!("{}  [{}]{}", wm.name, wm.exec, flags);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct CurrentResult {
    reported: Option<String>,
    matched: Option<WindowManager>,
    settings_module: Option<SettingsModule>,
}

fn handle_current(ctx: &Context, query: &dyn ScreenQuery) -> Result<(), PrefsError> {
    let registry = build_registry(ctx)?;
    let reported = query.window_manager_name();
    let (matched, settings_module) = match reported.as_deref() {
        Some(name) => (
            registry.find_current(name).cloned(),
            registry.settings_module(name),
        ),
        None => (None, None),
    };
    if ctx.json {
        return print_ok(CurrentResult {
            reported,
            matched,
            settings_module,
        });
    }
    match (&reported, &matched) {
        (None, _) => println!("no window manager identified"),
        (Some(reported), None) => println!("unknown window manager \"{reported}\""),
        (Some(reported), Some(wm)) => {
            println!("{} (reported as \"{reported}\")", wm.name);
            match &settings_module {
                Some(module) => println!("settings module: {}", module.module),
                None => println!("no settings integration available"),
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConfigureResult {
    command: String,
}

fn handle_configure(
    ctx: &Context,
    query: &dyn ScreenQuery,
    spawner: &dyn Spawner,
) -> Result<(), PrefsError> {
    let registry = build_registry(ctx)?;
    let command = spawn_config_tool(&registry, query, spawner)?;
    if ctx.json {
        print_ok(ConfigureResult { command })?;
    } else {
        println!("launched `{command}`");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SelectResult {
    window_manager: WindowManager,
    launched: bool,
}

fn handle_select(
    ctx: &Context,
    name: Option<String>,
    launch: bool,
    spawner: &dyn Spawner,
) -> Result<(), PrefsError> {
    let registry = build_registry(ctx)?;
    if registry.window_managers().is_empty() {
        return Err(PrefsError::Process(
            "no window managers found to select from".to_string(),
        ));
    }
    let wm = match name {
        Some(name) => registry
            .find_by_name(&name)
            .ok_or_else(|| PrefsError::Process(format!("unknown window manager \"{name}\"")))?,
        None => {
            if !io::stdin().is_terminal() {
                return Err(PrefsError::Process(
                    "interactive selection requires a TTY; pass a window manager name".to_string(),
                ));
            }
            let names: Vec<&str> = registry
                .window_managers()
                .iter()
                .map(|wm| wm.name.as_str())
                .collect();
            let index = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Window manager")
                .items(&names)
                .default(0)
                .interact()?;
            &registry.window_managers()[index]
        }
    };
    if launch {
        spawner.spawn_command_line(&wm.exec)?;
    }
    if ctx.json {
        print_ok(SelectResult {
            window_manager: wm.clone(),
            launched: launch,
        })?;
    } else if launch {
        println!("launched `{}`", wm.exec);
    } else {
        println!("{}  [{}]", wm.name, wm.exec);
    }
    Ok(())
}

/// Resolves a desktop entry the forgiving way: as a path, as a basename in
/// the user then system directories, then by the last path segment.
fn resolve_entry_path(id: &str, paths: &RegistryPaths) -> Option<PathBuf> {
    let direct = PathBuf::from(id);
    if direct.is_file() {
        return Some(direct);
    }
    for dir in [&paths.user_dir, &paths.system_dir] {
        let candidate = dir.join(id);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let basename = id.rsplit('/').next()?;
    if basename != id && !basename.is_empty() {
        for dir in [&paths.user_dir, &paths.system_dir] {
            let candidate = dir.join(basename);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn handle_show(ctx: &Context, id: &str) -> Result<(), PrefsError> {
    let cfg = read_config_or_default(&ctx.config_path)?;
    let paths = registry_paths(&cfg, &ctx.config_path);
    let path = resolve_entry_path(id, &paths)
        .ok_or_else(|| PrefsError::Process(format!("no desktop entry found for \"{id}\"")))?;
    let content = fs::read_to_string(&path)?;
    let entry = parse_desktop_entry(&content)?;
    let user_installed = path.starts_with(&paths.user_dir);
    let wm = window_manager_from_entry(&entry, &path, user_installed, &RealProgramProbe);
    if ctx.json {
        return print_ok(&wm);
    }
    println!("{}", path.display());
    println!("  name: {}", wm.name);
    println!("  exec: {}", wm.exec);
    if let Some(identify_name) = &wm.identify_name {
        println!("  identifies as: {identify_name}");
    }
    if let Some(config_exec) = &wm.config_exec {
        println!("  config tool: {config_exec}");
    }
    if let Some(settings_module) = &wm.settings_module {
        println!("  settings module: {settings_module}");
    }
    println!("  present: {}", wm.present);
    Ok(())
}
