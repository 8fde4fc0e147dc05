use futures::executor::LocalPool;
use itertools::Itertools;
use log::info;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use pixidol::destroyable::Destroyable;
use pixidol::game::{
    Clock, GuessOutcome, HangulController, PhotoController, Services, Settings, SystemClock,
};
use pixidol::model::{
    format_remaining, GameMode, GroupFilter, GuessSlot, HintReveal, KeyInput, RoundDisplay,
    SessionProjection, SessionView,
};
use pixidol::source::{FeedbackCategory, LogTelemetry, PoolFile, StaticPoolSource};
use pixidol::storage::{FileStore, KeyValueStore};

const USAGE: &str = "usage: pixidol <pool.json> [daily|infinite|hangul]";

const HELP: &str = "type a name and press enter to guess
  :skip            skip this round (infinite, hangul)
  :hint            spend the run's hint (infinite, hangul)
  :next            next round after a win or loss
  :mode <m>        switch between daily and infinite
  :filter <f>      boy-group, girl-group or both
  :feedback <msg>  send feedback
  :quit";

fn init_logging() {
    env_logger::init();
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

enum Game {
    Photo(PhotoController),
    Hangul(HangulController),
}

fn render(view: &SessionView) {
    match &view.display {
        Some(RoundDisplay::Photo(photo)) => {
            println!("photo: {}", view.current_image().unwrap_or("-"));
            if let Some(HintReveal::GroupName(group)) = &view.hint {
                println!("hint: {}", group);
            } else if view.phase.is_terminal() {
                println!("group: {}", photo.group_name);
            }
        }
        Some(RoundDisplay::Hangul(hangul)) => {
            println!("hangul: {}", hangul.hangul);
            if let Some(image) = view.current_image() {
                println!("photo: {}", image);
            }
        }
        None => println!("loading..."),
    }
    let slots = view
        .slots
        .iter()
        .map(|slot| match slot {
            GuessSlot::Empty => "[ ]",
            GuessSlot::Correct => "[o]",
            GuessSlot::Incorrect => "[x]",
        })
        .join(" ");
    let mut status = vec![format!("{} left", view.remaining_guesses())];
    if let Some(skips) = view.skips_remaining {
        status.push(format!("{} skips", skips));
    }
    status.push(format!("streak {}", view.streak));
    if view.mode == Some(GameMode::Daily) {
        if let Some(remaining) = view.countdown {
            status.push(format!("next in {}", format_remaining(remaining)));
        }
    }
    println!("{}   {}", slots, status.join(" | "));
}

fn report(outcome: &GuessOutcome) {
    match outcome {
        GuessOutcome::Rejected(reason) => println!("(ignored: {:?})", reason),
        GuessOutcome::Incorrect { remaining, .. } => println!("nope, {} left", remaining),
        GuessOutcome::Won { guess_number } => println!("correct in {}!", guess_number),
        GuessOutcome::Lost { answer } => println!("out of guesses: it was {}", answer),
        GuessOutcome::Discarded => {}
    }
}

fn main() {
    init_logging();

    let mut args = env::args().skip(1);
    let pool_path = args.next().map(PathBuf::from).unwrap_or_else(|| fail(USAGE));
    let start_mode = args.next().unwrap_or_else(|| "daily".to_string());

    let mut settings = Settings::load(&Settings::settings_path_from_env());
    // the terminal advances explicitly after each result
    settings.auto_advance_ms = None;

    let data_dir = Settings::data_dir_from_env();
    let store: Rc<dyn KeyValueStore> = match FileStore::new(&data_dir) {
        Ok(store) => Rc::new(store),
        Err(err) => fail(&format!("cannot use {}: {}", data_dir.display(), err)),
    };
    let pool = PoolFile::load(&pool_path).unwrap_or_else(|err| fail(&err.to_string()));
    info!(
        "Loaded {} photo and {} hangul rounds",
        pool.photo.len(),
        pool.hangul.len()
    );

    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let mut executor = LocalPool::new();
    let services = Services {
        source: Rc::new(StaticPoolSource::new(pool, Rc::clone(&clock), None)),
        telemetry: Rc::new(LogTelemetry),
        store,
        clock: Rc::clone(&clock),
        spawner: Rc::new(executor.spawner()),
    };

    let (game, observer) = match start_mode.as_str() {
        "hangul" => {
            let controller = HangulController::new(services, settings);
            let observer = controller.observer();
            (Game::Hangul(controller), observer)
        }
        "daily" | "infinite" => {
            let controller = PhotoController::new(services, settings);
            let observer = controller.observer();
            (Game::Photo(controller), observer)
        }
        other => fail(&format!("unknown mode {:?}\n{}", other, USAGE)),
    };
    let (projection, _subscription) = SessionProjection::attach(&observer);

    match &game {
        Game::Photo(controller) => {
            if controller.is_first_visit() {
                println!("{}", HELP);
                controller.mark_visited();
            }
            executor.run_until(controller.start());
            let mode = if start_mode == "infinite" {
                GameMode::Infinite
            } else {
                GameMode::Daily
            };
            if controller.mode() != mode {
                executor.run_until(controller.set_mode(mode));
            }
        }
        Game::Hangul(controller) => executor.run_until(controller.start()),
    }
    executor.run_until_stalled();
    render(projection.borrow().view());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let line = line.trim();

        if let Game::Photo(controller) = &game {
            if executor.run_until(controller.pump_timers()) {
                println!("a new daily round is up");
            }
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            (":quit", _) => break,
            (":help", _) => println!("{}", HELP),
            (":skip", _) => {
                let skipped = match &game {
                    Game::Photo(controller) => executor.run_until(controller.skip()),
                    Game::Hangul(controller) => executor.run_until(controller.skip()),
                };
                if !skipped {
                    println!("(can't skip now)");
                }
            }
            (":hint", _) => {
                let used = match &game {
                    Game::Photo(controller) => controller.use_hint(),
                    Game::Hangul(controller) => controller.use_hint(),
                };
                if !used {
                    println!("(no hint available)");
                }
            }
            (":next", _) => {
                match &game {
                    Game::Photo(controller) => executor.run_until(controller.next_round()),
                    Game::Hangul(controller) => executor.run_until(controller.next_round()),
                };
            }
            (":mode", mode) => match (&game, mode.trim()) {
                (Game::Photo(controller), "daily") => {
                    executor.run_until(controller.set_mode(GameMode::Daily))
                }
                (Game::Photo(controller), "infinite") => {
                    executor.run_until(controller.set_mode(GameMode::Infinite))
                }
                _ => println!("(modes: daily, infinite)"),
            },
            (":filter", filter) => match GroupFilter::parse(filter.trim()) {
                Some(filter) => match &game {
                    Game::Photo(controller) => executor.run_until(controller.set_group_filter(filter)),
                    Game::Hangul(controller) => {
                        executor.run_until(controller.set_group_filter(filter))
                    }
                },
                None => println!("(filters: boy-group, girl-group, both)"),
            },
            (":feedback", message) => {
                if let Game::Photo(controller) = &game {
                    controller.submit_feedback(FeedbackCategory::Other, message);
                }
            }
            (command, _) if command.starts_with(':') => println!("{}", HELP),
            _ => {
                let outcome = match &game {
                    Game::Photo(controller) => {
                        controller.set_input(line);
                        executor.run_until(controller.handle_key(KeyInput::Enter))
                    }
                    Game::Hangul(controller) => {
                        controller.set_input(line);
                        executor.run_until(controller.handle_key(KeyInput::Enter))
                    }
                };
                if let Some(outcome) = outcome {
                    report(&outcome);
                }
            }
        }
        executor.run_until_stalled();
        render(projection.borrow().view());
    }

    match game {
        Game::Photo(mut controller) => {
            controller.persist_now();
            controller.destroy();
        }
        Game::Hangul(mut controller) => {
            controller.persist_now();
            controller.destroy();
        }
    }
    info!(target: "session", "Session closed");
}
