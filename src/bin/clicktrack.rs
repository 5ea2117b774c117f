use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use clicktrack::engine::{MetronomeEngine, SoundParam, Voice, SAMPLE_RATE};
use clicktrack::offline::{render_program, write_wav};
use clicktrack::preset::PresetStore;
use clicktrack::program::ProgramSegment;
use clicktrack::{TimeSignature, VoiceSet};

const HELP_STRING: &str = "
--- Clicktrack Commands ---

>> TRANSPORT
  g           - Start the metronome
  s           - Stop the metronome
  q           - Quit

>> RHYTHM
  b <bpm>     - Set tempo (e.g. b 120 or b120)
  t <n/d>     - Set time signature (e.g. t 7/8)
  0,1,2,3     - Toggle subdivisions (0=off, 1=eighths, 2=sixteenths, 3=thirty-seconds)

>> SOUND PARAMETERS (n = 1:Accent, 2:Beat, 3:Sub)
  l<n> <ms>   - Click duration (e.g. l1 100)
  v<n> <vol>  - Volume 0-100 (e.g. v2 70)
  f<n> <hz>   - Frequency (e.g. f3 600)
  a<n> <ms>   - Attack in ms (e.g. a1 5)
  d<n> <ms>   - Decay in ms (e.g. d2 50)
  i           - Show current settings
  r           - Factory reset

>> PROGRAM (tempo ramps / muted sections)
  pa <start> <end> <bpm> [mute] - Add segment (e.g. pa 10 14 140)
  pr <start>  - Remove the segment starting at that bar
  pl          - List segments

>> PRESETS
  m           - List saved presets
  ms <name>   - Save current settings
  ml <name>   - Load a preset
  mc <name>   - Delete a preset
---------------------------
";

#[derive(Parser, Debug)]
#[command(name = "clicktrack", about = "Programmable command-line metronome")]
struct Cli {
    /// Override the preset file location
    #[arg(long)]
    presets: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive metronome shell (default)
    Play,
    /// Render a program to a WAV file without opening an audio device
    Render {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 16)]
        measures: u32,
        /// Start from a saved preset instead of factory defaults
        #[arg(long)]
        preset: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let preset_path = cli.presets.unwrap_or_else(default_preset_path);

    match cli.command.unwrap_or(Commands::Play) {
        Commands::Play => run_play(preset_path),
        Commands::Render {
            out,
            measures,
            preset,
        } => run_render(preset_path, out, measures, preset),
    }
}

fn default_preset_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("clicktrack").join("presets.json"))
        .unwrap_or_else(|| PathBuf::from("clicktrack_presets.json"))
}

/// Shell state the engine does not track: which preset is loaded and
/// whether it has been modified since.
struct ShellState {
    current_preset_id: Option<String>,
    dirty: bool,
}

fn run_play(preset_path: PathBuf) -> Result<ExitCode> {
    let mut store = PresetStore::open(&preset_path);
    let mut engine = MetronomeEngine::new(SAMPLE_RATE);
    let mut shell = ShellState {
        current_preset_id: None,
        dirty: false,
    };

    if let Some((id, state)) = store.last_used() {
        match engine.apply_state(&state) {
            Ok(()) => {
                if let Some(name) = store.name_of(&id) {
                    println!("Loaded last-used preset '{}'.", name);
                }
                shell.current_preset_id = Some(id);
            }
            Err(err) => println!("Could not apply last-used preset: {}", err),
        }
    }

    println!("--- CLICKTRACK ---");
    print_status(&engine, &store, &shell);
    println!("\nType '?' for the command list.");

    let stdin = io::stdin();
    loop {
        print!("clicktrack> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("reading stdin")? == 0 {
            break; // EOF behaves like quit
        }
        let input = line.trim().to_lowercase();
        if input.is_empty() {
            continue;
        }

        let (command, value) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, Some(rest.trim())),
            None => (input.as_str(), None),
        };

        match command {
            "q" => {
                if shell.dirty {
                    println!("Unsaved changes discarded (use 'ms <name>' to keep them).");
                }
                if let Err(err) = store.set_last_used(shell.current_preset_id.as_deref()) {
                    println!("Could not persist last-used preset: {}", err);
                }
                break;
            }
            "g" => match engine.start() {
                Ok(()) => println!("Metronome started."),
                Err(err) => println!("{}", err),
            },
            "s" => {
                let measures = engine.playback_handle().measures_elapsed();
                match engine.stop() {
                    Ok(()) => println!("Metronome stopped after {} measures.", measures),
                    Err(err) => println!("{}", err),
                }
            }
            "i" => print_status(&engine, &store, &shell),
            "?" => println!("{}", HELP_STRING),
            "r" => {
                engine.reset_to_defaults();
                shell.current_preset_id = None;
                shell.dirty = false;
                println!("Factory defaults restored.");
            }
            "0" | "1" | "2" | "3" => {
                let target: u8 = match command {
                    "1" => 2,
                    "2" => 4,
                    "3" => 8,
                    _ => 0,
                };
                // Entering the active level again switches subdivisions off
                let level = if target != 0 && engine.status().subdivision_level == target {
                    0
                } else {
                    target
                };
                apply(&mut shell, engine.set_subdivision(level), || {
                    let text = match level {
                        2 => "eighths (2 per beat)",
                        4 => "sixteenths (4 per beat)",
                        8 => "thirty-seconds (8 per beat)",
                        _ => "off",
                    };
                    format!("Subdivisions: {}", text)
                });
            }
            "t" => match value.and_then(|v| v.parse::<TimeSignature>().ok()) {
                Some(signature) => apply(
                    &mut shell,
                    engine.set_time_signature(signature.beats_per_measure, signature.note_value),
                    || format!("Time signature set to {}.", signature),
                ),
                None => println!("Invalid time signature. Use t <n>/<d>, e.g. t 4/4"),
            },
            "pl" => print_program(&engine),
            "pa" => handle_add_segment(&engine, &mut shell, value),
            "pr" => match value.and_then(|v| v.parse::<u32>().ok()) {
                Some(start_bar) => apply(&mut shell, engine.remove_segment(start_bar), || {
                    format!("Segment at bar {} removed.", start_bar)
                }),
                None => println!("Usage: pr <start-bar>"),
            },
            "m" => print_presets(&store, &shell),
            "ms" => handle_save_preset(&engine, &mut store, &mut shell, value),
            "ml" => handle_load_preset(&engine, &store, &mut shell, value),
            "mc" => handle_delete_preset(&engine, &mut store, &mut shell, value),
            _ => {
                if !try_tempo_command(&engine, &mut shell, command, value)
                    && !try_sound_command(&engine, &mut shell, command, value)
                {
                    println!("Unknown command '{}'. Type '?' for the list.", input);
                }
            }
        }
    }

    if engine.is_running() {
        let _ = engine.stop();
    }
    println!("Goodbye.");
    Ok(ExitCode::from(0))
}

/// Apply a mutator result: print, and mark the shell dirty on success.
fn apply<F: FnOnce() -> String>(
    shell: &mut ShellState,
    result: Result<(), clicktrack::error::CommandError>,
    message: F,
) {
    match result {
        Ok(()) => {
            println!("{}", message());
            shell.dirty = true;
        }
        Err(err) => println!("{}", err),
    }
}

/// `b 120` or `b120`.
fn try_tempo_command(
    engine: &MetronomeEngine,
    shell: &mut ShellState,
    command: &str,
    value: Option<&str>,
) -> bool {
    let Some(rest) = command.strip_prefix('b') else {
        return false;
    };
    let parsed = if rest.is_empty() {
        value.and_then(|v| v.parse::<u32>().ok())
    } else {
        rest.parse::<u32>().ok()
    };
    match parsed {
        Some(bpm) => apply(shell, engine.set_bpm(bpm), || {
            format!("BPM set to {}. Takes effect at the next measure.", bpm)
        }),
        None => println!("Invalid tempo. Use b <bpm>, e.g. b120"),
    }
    true
}

/// `l1 100`, `v2 70`, `f3 600`, `a1 5`, `d2 50`.
fn try_sound_command(
    engine: &MetronomeEngine,
    shell: &mut ShellState,
    command: &str,
    value: Option<&str>,
) -> bool {
    let mut chars = command.chars();
    let (Some(letter), Some(digit), None) = (chars.next(), chars.next(), chars.next()) else {
        return false;
    };
    let param = match letter {
        'l' => SoundParam::DurationMs,
        'v' => SoundParam::VolumePercent,
        'f' => SoundParam::FrequencyHz,
        'a' => SoundParam::AttackMs,
        'd' => SoundParam::DecayMs,
        _ => return false,
    };
    let voice = match digit {
        '1' => Voice::Accent,
        '2' => Voice::Beat,
        '3' => Voice::Subdivision,
        _ => return false,
    };
    match value.and_then(|v| v.parse::<f32>().ok()) {
        Some(number) => apply(shell, engine.set_sound_param(voice, param, number), || {
            format!("{} updated.", voice_name(voice))
        }),
        None => println!("Invalid value. Use {} <number>", command),
    }
    true
}

fn handle_add_segment(engine: &MetronomeEngine, shell: &mut ShellState, value: Option<&str>) {
    let parts: Vec<&str> = value.unwrap_or("").split_whitespace().collect();
    let parsed = match parts.as_slice() {
        [start, end, bpm] => Some((start, end, bpm, true)),
        [start, end, bpm, flag] if *flag == "mute" => Some((start, end, bpm, false)),
        _ => None,
    };
    let Some((start, end, bpm, is_audible)) = parsed else {
        println!("Usage: pa <start-bar> <end-bar> <bpm> [mute]");
        return;
    };
    let (Ok(start_bar), Ok(end_bar), Ok(target_bpm)) =
        (start.parse::<u32>(), end.parse::<u32>(), bpm.parse::<u32>())
    else {
        println!("Usage: pa <start-bar> <end-bar> <bpm> [mute]");
        return;
    };
    let segment = ProgramSegment {
        start_bar,
        end_bar,
        target_bpm,
        is_audible,
    };
    apply(shell, engine.add_segment(segment), || {
        format!(
            "Segment added: bars {}-{} -> {} BPM{}.",
            start_bar,
            end_bar,
            target_bpm,
            if is_audible { "" } else { " (muted)" }
        )
    });
}

fn handle_save_preset(
    engine: &MetronomeEngine,
    store: &mut PresetStore,
    shell: &mut ShellState,
    value: Option<&str>,
) {
    let Some(name) = value.filter(|name| !name.is_empty()) else {
        println!("Usage: ms <name>");
        return;
    };
    match store.save_preset(name, &engine.capture_state(), None) {
        Ok(id) => {
            println!("Preset saved as 'ID{} {}'.", id, name);
            shell.current_preset_id = Some(id);
            shell.dirty = false;
        }
        Err(err) => println!("{}", err),
    }
}

fn handle_load_preset(
    engine: &MetronomeEngine,
    store: &PresetStore,
    shell: &mut ShellState,
    value: Option<&str>,
) {
    let Some(term) = value.filter(|term| !term.is_empty()) else {
        println!("Usage: ml <name>");
        return;
    };
    match store.find(term) {
        Ok((id, state)) => match engine.apply_state(&state) {
            Ok(()) => {
                println!(
                    "Preset '{}' loaded.",
                    store.name_of(&id).unwrap_or_else(|| id.clone())
                );
                shell.current_preset_id = Some(id);
                shell.dirty = false;
            }
            Err(err) => println!("Preset rejected: {}", err),
        },
        Err(err) => println!("{}", err),
    }
}

fn handle_delete_preset(
    engine: &MetronomeEngine,
    store: &mut PresetStore,
    shell: &mut ShellState,
    value: Option<&str>,
) {
    let Some(term) = value.filter(|term| !term.is_empty()) else {
        println!("Usage: mc <name>");
        return;
    };
    match store.delete(term) {
        Ok((id, name)) => {
            println!("Preset '{}' deleted.", name);
            if shell.current_preset_id.as_deref() == Some(id.as_str()) {
                // The active preset is gone: fall back to the first
                // remaining preset, or to factory defaults
                shell.current_preset_id = None;
                shell.dirty = false;
                if let Some((next_id, _)) = store.list().first().cloned() {
                    if let Ok(state) = store.get(&next_id) {
                        if engine.apply_state(&state).is_ok() {
                            println!(
                                "Switched to '{}'.",
                                store.name_of(&next_id).unwrap_or_else(|| next_id.clone())
                            );
                            shell.current_preset_id = Some(next_id);
                        }
                    }
                } else {
                    engine.reset_to_defaults();
                    println!("No presets left; factory defaults restored.");
                }
            }
        }
        Err(err) => println!("{}", err),
    }
}

fn voice_name(voice: Voice) -> &'static str {
    match voice {
        Voice::Accent => "Accent",
        Voice::Beat => "Beat",
        Voice::Subdivision => "Subdivision",
    }
}

fn print_status(engine: &MetronomeEngine, store: &PresetStore, shell: &ShellState) {
    let status = engine.status();

    println!("\n--- Clicktrack Status ---");
    let preset = match &shell.current_preset_id {
        Some(id) => store.name_of(id).unwrap_or_else(|| format!("ID{}", id)),
        None => "Default".to_string(),
    };
    let modified = if shell.dirty { " (modified)" } else { "" };
    println!("Preset: {}{}", preset, modified);

    let subdivision = match status.subdivision_level {
        2 => "eighths",
        4 => "sixteenths",
        8 => "thirty-seconds",
        _ => "off",
    };
    let mut transport = if status.running {
        format!("playing, measure {}", status.measures_elapsed + 1)
    } else {
        "stopped".to_string()
    };
    if status.ramp_active {
        transport.push_str(", ramping");
    }
    if status.muted {
        transport.push_str(", muted");
    }
    println!(
        "Tempo: {} BPM  |  Time: {}  |  Subdivisions: {}  |  {}",
        status.bpm, status.signature, subdivision, transport
    );
    if !status.segments.is_empty() {
        println!("Program: {} segments ('pl' to list)", status.segments.len());
    }

    println!("---------------------------------------------------------");
    println!(
        "{:<12} | {:<12} | {:<12} | {:<12}",
        "Parameter", "Accent (1)", "Beat (2)", "Sub (3)"
    );
    println!("---------------------------------------------------------");
    let voices = &status.voices;
    let rows: [(&str, fn(&clicktrack::SoundParams) -> String, &str); 5] = [
        ("Duration (l)", |p| format!("{}", p.duration_ms), "ms"),
        ("Volume (v)", |p| format!("{}", p.volume_percent), "%"),
        ("Freq (f)", |p| format!("{}", p.frequency_hz), "Hz"),
        ("Attack (a)", |p| format!("{}", p.attack_ms), "ms"),
        ("Decay (d)", |p| format!("{}", p.decay_ms), "ms"),
    ];
    for (label, getter, unit) in rows {
        println!(
            "{:<12} | {:<10} {:<2}| {:<10} {:<2}| {:<10} {:<2}",
            label,
            getter(&voices.accent),
            unit,
            getter(&voices.beat),
            unit,
            getter(&voices.subdivision),
            unit
        );
    }
    println!("---------------------------------------------------------");
}

fn print_program(engine: &MetronomeEngine) {
    let segments = engine.segments();
    if segments.is_empty() {
        println!("No program segments. Add one with 'pa <start> <end> <bpm> [mute]'.");
        return;
    }
    println!("\n--- Program ---");
    for segment in segments {
        println!(
            "  bars {:>4}-{:<4}  -> {:>4} BPM  {}",
            segment.start_bar,
            segment.end_bar,
            segment.target_bpm,
            if segment.is_audible { "" } else { "(muted)" }
        );
    }
}

fn print_presets(store: &PresetStore, shell: &ShellState) {
    let presets = store.list();
    if presets.is_empty() {
        println!("No presets saved.");
        return;
    }
    println!("\n--- Saved Presets ---");
    for (id, name) in presets {
        let marker = if shell.current_preset_id.as_deref() == Some(id.as_str()) {
            "* "
        } else {
            "  "
        };
        println!("  {}{}", marker, name);
    }
}

fn run_render(
    preset_path: PathBuf,
    out: PathBuf,
    measures: u32,
    preset: Option<String>,
) -> Result<ExitCode> {
    let store = PresetStore::open(&preset_path);

    let (bpm, signature, subdivision_level, voices, segments) = match preset {
        Some(term) => {
            let (_, state) = store
                .find(&term)
                .with_context(|| format!("loading preset '{}'", term))?;
            let signature: TimeSignature = state
                .time_signature
                .parse()
                .with_context(|| format!("preset time signature '{}'", state.time_signature))?;
            let voices = VoiceSet {
                accent: state.accent,
                beat: state.beat,
                subdivision: state.subdivision,
            };
            (
                state.bpm,
                signature,
                state.subdivision_level,
                voices,
                state.program,
            )
        }
        None => (
            clicktrack::DEFAULT_BPM,
            TimeSignature::FOUR_FOUR,
            0,
            VoiceSet::default(),
            Vec::new(),
        ),
    };

    let samples = render_program(
        bpm,
        signature,
        subdivision_level,
        &voices,
        &segments,
        measures,
        SAMPLE_RATE,
    );
    write_wav(&out, &samples, SAMPLE_RATE)
        .with_context(|| format!("writing {}", out.display()))?;

    println!(
        "Wrote {} measures ({} samples) to {}",
        measures,
        samples.len(),
        out.display()
    );
    Ok(ExitCode::from(0))
}
