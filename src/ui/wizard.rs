use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::aggregate::DEFAULT_ACCOUNT;
use crate::providers::PROVIDERS;
use crate::setup;
use crate::storage::{Account, CredentialStore};

const MAIN_MENU: &[&str] = &[
    "Add Account",
    "List Accounts",
    "Rename Account",
    "Remove Account",
    "Migrate Claude CLI",
    "Quit",
];

pub fn run(store: &dyn CredentialStore) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut wizard = Wizard::new(store);
    let res = run_wizard(&mut terminal, &mut wizard);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_wizard(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    wizard: &mut Wizard,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, wizard))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    wizard.handle_key(key);
                }
            }
        }

        if wizard.should_quit {
            return Ok(());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountAction {
    Rename,
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
enum Screen {
    MainMenu,
    ProviderSelect,
    AccountName { provider: &'static str },
    Secret { provider: &'static str, account: String },
    ListAccounts,
    AccountSelect { action: AccountAction },
    NewName { account: Account },
    ConfirmRemove { account: Account },
    Message { text: String, is_error: bool },
}

struct Wizard<'a> {
    store: &'a dyn CredentialStore,
    screen: Screen,
    selected: usize,
    input: Input,
    accounts: Vec<Account>,
    should_quit: bool,
}

impl<'a> Wizard<'a> {
    fn new(store: &'a dyn CredentialStore) -> Self {
        Self {
            store,
            screen: Screen::MainMenu,
            selected: 0,
            input: Input::default(),
            accounts: Vec::new(),
            should_quit: false,
        }
    }

    fn go(&mut self, screen: Screen) {
        self.screen = screen;
        self.selected = 0;
        self.input.reset();
    }

    fn go_with_input(&mut self, screen: Screen, value: &str) {
        self.go(screen);
        self.input = Input::new(value.to_string());
    }

    fn message(&mut self, result: Result<String>) {
        let screen = match result {
            Ok(text) => Screen::Message {
                text,
                is_error: false,
            },
            Err(err) => Screen::Message {
                text: format!("{:#}", err),
                is_error: true,
            },
        };
        self.go(screen);
    }

    fn reload_accounts(&mut self) {
        match self.store.list_accounts() {
            Ok(accounts) => self.accounts = accounts,
            Err(err) => {
                self.accounts.clear();
                self.message(Err(err));
            }
        }
    }

    fn item_count(&self) -> usize {
        match self.screen {
            Screen::MainMenu => MAIN_MENU.len(),
            Screen::ProviderSelect => PROVIDERS.len(),
            Screen::AccountSelect { .. } => self.accounts.len(),
            _ => 0,
        }
    }

    fn next(&mut self) {
        let count = self.item_count();
        if count > 0 && self.selected + 1 < count {
            self.selected += 1;
        }
    }

    fn previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match self.screen.clone() {
            Screen::MainMenu => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                KeyCode::Up | KeyCode::Char('k') => self.previous(),
                KeyCode::Down | KeyCode::Char('j') => self.next(),
                KeyCode::Enter | KeyCode::Char(' ') => self.select_main_menu(),
                _ => {}
            },
            Screen::ProviderSelect => match key.code {
                KeyCode::Esc => self.go(Screen::MainMenu),
                KeyCode::Up | KeyCode::Char('k') => self.previous(),
                KeyCode::Down | KeyCode::Char('j') => self.next(),
                KeyCode::Enter => {
                    let (provider, _) = PROVIDERS[self.selected];
                    self.go_with_input(Screen::AccountName { provider }, DEFAULT_ACCOUNT);
                }
                _ => {}
            },
            Screen::AccountName { provider } => match key.code {
                KeyCode::Esc => self.go(Screen::ProviderSelect),
                KeyCode::Enter => {
                    let account = self.input.value().trim().to_string();
                    if !account.is_empty() {
                        self.go(Screen::Secret { provider, account });
                    }
                }
                _ => self.edit(key),
            },
            Screen::Secret { provider, account } => match key.code {
                KeyCode::Esc => self.go(Screen::MainMenu),
                KeyCode::Enter => {
                    let result =
                        setup::add_account(self.store, provider, &account, self.input.value())
                            .and_then(|()| {
                                let name = setup::provider_name(provider)?;
                                Ok(format!("Saved {} account '{}'", name, account))
                            });
                    self.message(result);
                }
                _ => self.edit(key),
            },
            Screen::ListAccounts => match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => self.go(Screen::MainMenu),
                _ => {}
            },
            Screen::AccountSelect { action } => match key.code {
                KeyCode::Esc => self.go(Screen::MainMenu),
                KeyCode::Up | KeyCode::Char('k') => self.previous(),
                KeyCode::Down | KeyCode::Char('j') => self.next(),
                KeyCode::Enter => {
                    if let Some(account) = self.accounts.get(self.selected).cloned() {
                        match action {
                            AccountAction::Rename => {
                                let name = account.name.clone();
                                self.go_with_input(Screen::NewName { account }, &name);
                            }
                            AccountAction::Remove => self.go(Screen::ConfirmRemove { account }),
                        }
                    }
                }
                _ => {}
            },
            Screen::NewName { account } => match key.code {
                KeyCode::Esc => self.select_account(AccountAction::Rename),
                KeyCode::Enter => {
                    let new_name = self.input.value().trim().to_string();
                    let result = setup::rename_account(
                        self.store,
                        &account.provider,
                        &account.name,
                        &new_name,
                    )
                    .map(|()| format!("Renamed '{}' to '{}'", account.name, new_name));
                    self.message(result);
                }
                _ => self.edit(key),
            },
            Screen::ConfirmRemove { account } => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    let result =
                        setup::remove_account(self.store, &account.provider, &account.name)
                            .map(|()| {
                                format!("Removed '{}' from {}", account.name, account.provider)
                            });
                    self.message(result);
                }
                KeyCode::Char('n') | KeyCode::Esc => self.select_account(AccountAction::Remove),
                _ => {}
            },
            Screen::Message { .. } => self.go(Screen::MainMenu),
        }
    }

    fn edit(&mut self, key: KeyEvent) {
        self.input.handle_event(&Event::Key(key));
    }

    fn select_account(&mut self, action: AccountAction) {
        self.go(Screen::AccountSelect { action });
        self.reload_accounts();
    }

    fn select_main_menu(&mut self) {
        match MAIN_MENU[self.selected] {
            "Add Account" => self.go(Screen::ProviderSelect),
            "List Accounts" => {
                self.go(Screen::ListAccounts);
                self.reload_accounts();
            }
            "Rename Account" => self.select_account(AccountAction::Rename),
            "Remove Account" => self.select_account(AccountAction::Remove),
            "Migrate Claude CLI" => {
                let result = setup::migrate_claude(self.store).map(|expires_at| match expires_at {
                    Some(at) => format!(
                        "Imported Claude CLI credentials (token expires {})",
                        at.format("%Y-%m-%d %H:%M UTC")
                    ),
                    None => "Imported Claude CLI credentials".to_string(),
                });
                self.message(result);
            }
            _ => self.should_quit = true,
        }
    }
}

fn ui(f: &mut Frame, wizard: &Wizard) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.size());

    // Header
    let header = Paragraph::new("llm-usage - Account Setup")
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    match &wizard.screen {
        Screen::MainMenu => {
            let items: Vec<String> = MAIN_MENU.iter().map(|item| item.to_string()).collect();
            render_list(f, chunks[1], "Main Menu", &items, wizard.selected);
        }
        Screen::ProviderSelect => {
            let items: Vec<String> = PROVIDERS
                .iter()
                .map(|(id, name)| format!("{} - {}", id, name))
                .collect();
            render_list(f, chunks[1], "Select Provider", &items, wizard.selected);
        }
        Screen::AccountName { provider } => {
            let title = format!("Account name for {}", provider);
            render_input(f, chunks[1], &title, wizard.input.value(), &wizard.input);
        }
        Screen::Secret { provider, account } => {
            let title = format!("API key or token for {} ({})", provider, account);
            let masked = "*".repeat(wizard.input.value().chars().count());
            render_input(f, chunks[1], &title, &masked, &wizard.input);
        }
        Screen::ListAccounts => {
            let items = account_items(&wizard.accounts);
            render_list(f, chunks[1], "Configured Accounts", &items, usize::MAX);
        }
        Screen::AccountSelect { action } => {
            let title = match action {
                AccountAction::Rename => "Select account to rename",
                AccountAction::Remove => "Select account to remove",
            };
            let items = account_items(&wizard.accounts);
            render_list(f, chunks[1], title, &items, wizard.selected);
        }
        Screen::NewName { account } => {
            let title = format!("New name for '{}' ({})", account.name, account.provider);
            render_input(f, chunks[1], &title, wizard.input.value(), &wizard.input);
        }
        Screen::ConfirmRemove { account } => {
            let text = format!(
                "Remove account '{}' from {}? This deletes its stored credentials.\n\n(y)es / (n)o",
                account.name, account.provider
            );
            render_popup(f, "Confirm Removal", &text, Color::Yellow);
        }
        Screen::Message { text, is_error } => {
            let (title, color) = if *is_error {
                ("Error", Color::Red)
            } else {
                ("Success", Color::Green)
            };
            render_popup(f, title, text, color);
        }
    }

    let footer = Paragraph::new(Line::from(footer_hint(&wizard.screen)))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, chunks[2]);
}

fn footer_hint(screen: &Screen) -> Vec<Span<'static>> {
    let bindings: &[&str] = match screen {
        Screen::MainMenu => &["↑/k", "↓/j", "enter", "q"],
        Screen::ProviderSelect | Screen::AccountSelect { .. } => &["↑/k", "↓/j", "enter", "esc"],
        Screen::AccountName { .. } | Screen::Secret { .. } | Screen::NewName { .. } => {
            &["type", "enter", "esc"]
        }
        Screen::ListAccounts => &["esc"],
        Screen::ConfirmRemove { .. } => &["y", "n"],
        Screen::Message { .. } => &["any key"],
    };

    let mut spans = Vec::new();
    for (i, binding) in bindings.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(
            *binding,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }
    spans
}

fn account_items(accounts: &[Account]) -> Vec<String> {
    if accounts.is_empty() {
        return vec!["No accounts configured".to_string()];
    }

    accounts
        .iter()
        .map(|account| format!("{} ({})", account.name, account.provider))
        .collect()
}

fn render_list(f: &mut Frame, area: Rect, title: &str, items: &[String], selected: usize) {
    let items: Vec<ListItem> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let style = if i == selected {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(item.as_str()).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title.to_string())
            .title_alignment(Alignment::Center),
    );
    f.render_widget(list, area);
}

fn render_input(f: &mut Frame, area: Rect, title: &str, shown: &str, input: &Input) {
    let area = Rect {
        height: area.height.min(3),
        ..area
    };
    let width = area.width.saturating_sub(2) as usize;
    let scroll = input.visual_scroll(width);

    let field = Paragraph::new(shown)
        .scroll((0, scroll as u16))
        .block(Block::default().borders(Borders::ALL).title(title.to_string()));
    f.render_widget(field, area);

    f.set_cursor(
        area.x + (input.visual_cursor().max(scroll) - scroll) as u16 + 1,
        area.y + 1,
    );
}

fn render_popup(f: &mut Frame, title: &str, text: &str, color: Color) {
    let area = centered_rect(60, 30, f.size());
    f.render_widget(Clear, area);

    let popup = Paragraph::new(text.to_string())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(
                    title.to_string(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )),
        );
    f.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
