//! Pigeon Desktop — egui app state and UI.
//!
//! The window is a renderer over the sync engine's event stream: a
//! background thread runs the bridge and engine on a tokio runtime, the UI
//! drains `ChatEvent`s each frame and rebuilds its render model from them,
//! and user actions go back as `Command`s. The UI never touches the
//! engine's stores.

use eframe::egui;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;

use lib::bridge::WsBridge;
use lib::config;
use lib::contacts::Contact;
use lib::events::{ChatEvent, Command, Identity};
use lib::sync::SyncController;
use lib::timeline::{Message, SentBy};

const LOG_BUFFER_MAX_LINES: usize = 2000;
const PUSH_CHANNEL_CAPACITY: usize = 64;
const SIDEBAR_WIDTH: f32 = 220.0;

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Chat,
    Logs,
}

/// Channel endpoints for one engine session (recreated on reconnect).
struct EngineLink {
    events: mpsc::UnboundedReceiver<ChatEvent>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Spawn the engine thread: a tokio runtime that connects the bridge and
/// runs the sync controller until either side hangs up. Failures come back
/// as `ChatEvent::Error` so the UI can show them.
fn spawn_engine() -> EngineLink {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                let _ = event_tx.send(ChatEvent::Error(format!("tokio runtime: {}", e)));
                return;
            }
        };
        rt.block_on(async move {
            let (config, _) = config::load_config(None).unwrap_or_else(|e| {
                log::warn!("config unreadable, using defaults: {}", e);
                (config::Config::default(), std::path::PathBuf::new())
            });
            let port = config::resolve_bridge_port(&config);
            let (push_tx, push_rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
            let bridge = match WsBridge::connect(&config.bridge.host, port, push_tx).await {
                Ok(bridge) => bridge,
                Err(e) => {
                    let _ = event_tx.send(ChatEvent::Error(format!("backend unreachable: {}", e)));
                    return;
                }
            };
            let controller = SyncController::new(bridge, event_tx.clone());
            if let Err(e) = controller.run(push_rx, cmd_rx).await {
                let _ = event_tx.send(ChatEvent::Error(format!("engine stopped: {}", e)));
            }
        });
    });
    EngineLink {
        events: event_rx,
        commands: cmd_tx,
    }
}

pub struct PigeonApp {
    link: EngineLink,
    /// True once the engine's event channel disconnected (thread exited).
    engine_gone: bool,
    identity: Option<Identity>,
    /// Render model, rebuilt exclusively from ChatEvents.
    contacts: Vec<Contact>,
    transcripts: HashMap<String, Vec<Message>>,
    /// Selection as confirmed by SelectionChanged (clicks only send a command).
    selected: Option<String>,
    chat_input: String,
    add_contact_input: String,
    last_error: Option<String>,
    current_screen: Screen,
}

impl PigeonApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");
        Self {
            link: spawn_engine(),
            engine_gone: false,
            identity: None,
            contacts: Vec::new(),
            transcripts: HashMap::new(),
            selected: None,
            chat_input: String::new(),
            add_contact_input: String::new(),
            last_error: None,
            current_screen: Screen::default(),
        }
    }

    /// Drop the old engine session and start a fresh one; the new engine
    /// replays everything through startup events, so the render model is
    /// rebuilt from scratch.
    fn reconnect(&mut self) {
        self.identity = None;
        self.contacts.clear();
        self.transcripts.clear();
        self.selected = None;
        self.last_error = None;
        self.engine_gone = false;
        self.link = spawn_engine();
        log::info!("reconnecting to backend");
    }

    /// Drain pending engine events. Call each frame.
    fn poll_events(&mut self) {
        loop {
            match self.link.events.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.engine_gone = true;
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Ready { identity } => {
                log::info!("connected as {}", identity.uuid);
                self.identity = Some(identity);
            }
            ChatEvent::ContactAdded(contact) => {
                self.transcripts.entry(contact.id.clone()).or_default();
                self.contacts.push(contact);
            }
            ChatEvent::MessageAppended { contact_id, message } => {
                self.transcripts.entry(contact_id).or_default().push(message);
            }
            ChatEvent::SelectionChanged { contact_id } => {
                self.selected = Some(contact_id);
            }
            ChatEvent::ContactRequestFailed => {
                self.last_error = Some("contact request failed".to_string());
            }
            ChatEvent::Error(message) => {
                log::warn!("{}", message);
                self.last_error = Some(message);
            }
        }
    }

    fn send_command(&self, command: Command) {
        // A closed channel means the engine is gone; the header shows
        // Reconnect and poll_events flips engine_gone.
        let _ = self.link.commands.send(command);
    }

    fn send_chat_input(&mut self) {
        let text = self.chat_input.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.chat_input.clear();
        self.send_command(Command::Send(text));
    }

    fn request_contact(&mut self) {
        let uuid = self.add_contact_input.trim().to_string();
        if uuid.is_empty() {
            return;
        }
        self.add_contact_input.clear();
        self.last_error = None;
        self.send_command(Command::RequestContact(uuid));
    }

    fn ui_header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Pigeon");
            ui.separator();
            if ui
                .selectable_label(self.current_screen == Screen::Chat, "Chat")
                .clicked()
            {
                self.current_screen = Screen::Chat;
            }
            if ui
                .selectable_label(self.current_screen == Screen::Logs, "Logs")
                .clicked()
            {
                self.current_screen = Screen::Logs;
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if self.engine_gone {
                    if ui.button("Reconnect").clicked() {
                        self.reconnect();
                    }
                    ui.colored_label(egui::Color32::RED, "disconnected");
                } else if let Some(ref identity) = self.identity {
                    ui.label(format!("{} <{}>", identity.display_name, identity.uuid));
                } else {
                    ui.label("connecting…");
                }
            });
        });
    }

    fn ui_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.add_space(8.0);
        ui.label(egui::RichText::new("Contacts").strong());
        ui.add_space(4.0);
        if self.contacts.is_empty() {
            ui.label("No contacts yet.");
        }
        let mut clicked: Option<String> = None;
        for contact in &self.contacts {
            let is_selected = self.selected.as_deref() == Some(contact.id.as_str());
            if ui
                .selectable_label(is_selected, &contact.display_name)
                .on_hover_text(&contact.id)
                .clicked()
            {
                clicked = Some(contact.id.clone());
            }
        }
        if let Some(id) = clicked {
            self.send_command(Command::SetActive(id));
        }

        ui.with_layout(egui::Layout::bottom_up(egui::Align::Min), |ui| {
            ui.add_space(8.0);
            if ui.button("Request contact").clicked() {
                self.request_contact();
            }
            ui.add(
                egui::TextEdit::singleline(&mut self.add_contact_input)
                    .hint_text("contact uuid"),
            );
            ui.label(egui::RichText::new("Add contact").strong());
        });
    }

    fn ui_transcript(&self, ui: &mut egui::Ui, contact_id: &str) {
        let messages = self.transcripts.get(contact_id);
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .show(ui, |ui| {
                let content_width = ui.available_width();
                ui.allocate_exact_size(egui::vec2(content_width, 0.0), egui::Sense::hover());
                for message in messages.into_iter().flatten() {
                    Self::render_message(ui, message);
                    ui.add_space(6.0);
                }
            });
    }

    fn render_message(ui: &mut egui::Ui, message: &Message) {
        let is_own = message.sent_by == SentBy::Me;
        let frame = egui::Frame::none()
            .fill(if is_own {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(
                1.0,
                ui.style().visuals.widgets.noninteractive.bg_stroke.color,
            ))
            .rounding(egui::Rounding::same(6.0))
            .inner_margin(egui::Margin::same(6.0));
        frame.show(ui, |ui| {
            if is_own {
                ui.label(egui::RichText::new(&message.body).strong());
            } else {
                ui.label(&message.body);
            }
        });
    }

    fn ui_chat(&mut self, ui: &mut egui::Ui) {
        let Some(contact_id) = self.selected.clone() else {
            ui.add_space(24.0);
            ui.label("Select a contact to start chatting.");
            return;
        };

        let input_height = ui.spacing().interact_size.y + 16.0;
        let available = ui.available_height();
        let transcript_height = (available - input_height - 24.0).max(80.0);

        ui.allocate_ui_with_layout(
            egui::vec2(ui.available_width(), transcript_height),
            egui::Layout::top_down(egui::Align::Min),
            |ui| self.ui_transcript(ui, &contact_id),
        );

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let response = ui.add_sized(
                [ui.available_width() - 72.0, ui.spacing().interact_size.y],
                egui::TextEdit::singleline(&mut self.chat_input).hint_text("message"),
            );
            let enter_pressed =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Send").clicked() || enter_pressed {
                self.send_chat_input();
                response.request_focus();
            }
        });
    }

    fn ui_logs(&self, ui: &mut egui::Ui) {
        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace));
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
    }
}

impl eframe::App for PigeonApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_events();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(8.0);
            self.ui_header(ui);
            ui.add_space(8.0);
        });

        if let Some(err) = self.last_error.clone() {
            egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::RED, &err);
                    if ui.small_button("dismiss").clicked() {
                        self.last_error = None;
                    }
                });
            });
        }

        egui::SidePanel::left("contacts")
            .resizable(false)
            .exact_width(SIDEBAR_WIDTH)
            .show(ctx, |ui| self.ui_sidebar(ui));

        egui::CentralPanel::default().show(ctx, |ui| match self.current_screen {
            Screen::Chat => self.ui_chat(ui),
            Screen::Logs => self.ui_logs(ui),
        });

        // Background events (incoming messages) must show without user input.
        ctx.request_repaint_after(Duration::from_millis(200));
    }
}
