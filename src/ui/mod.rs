/// User interface
///
/// - canvas.rs: the map surface
/// - panel.rs: creation forms for a pending placement
/// - details.rs: Location and Prospect details

pub mod canvas;
pub mod details;
pub mod panel;

use iced::widget::{button, container, horizontal_space, row, text};
use iced::{Alignment, Element, Length};

use crate::map::popup::format_heading;
use crate::map::viewport::ViewportEvent;
use crate::sensor::PermissionState;
use crate::state::placement::PlacementMode;
use crate::Message;

/// Degrees turned by the rotate buttons
pub const ROTATE_STEP: f64 = 15.0;

/// What the toolbar needs to know
#[derive(Debug, Clone, Copy)]
pub struct ToolbarState {
    /// Armed or pending mode; `None` when idle
    pub placement: Option<PlacementMode>,
    pub armed: bool,
    pub map_bearing: f64,
    pub heading: Option<f64>,
    pub permission: PermissionState,
    pub has_fix: bool,
    /// "Loading..." or "Syncing..." while the cached lists catch up
    pub sync: Option<&'static str>,
}

pub fn toolbar(state: ToolbarState) -> Element<'static, Message> {
    let add = |label: &'static str, mode: PlacementMode| {
        let active = state.placement == Some(mode);
        button(text(if active { "Cancel" } else { label }))
            .on_press(match state.placement {
                // the other mode can only be picked while armed
                Some(current) if current != mode && state.armed => Message::SelectMode(mode),
                _ => Message::ToggleAdd(mode),
            })
            .style(if active { button::danger } else { button::primary })
    };

    let rotate = |label: &'static str, delta: f64| {
        button(label).on_press(Message::Viewport(ViewportEvent::Rotate(state.map_bearing + delta)))
    };

    let compass = match state.permission {
        PermissionState::Granted | PermissionState::Denied => None,
        PermissionState::Unknown | PermissionState::Unavailable => {
            Some(button("Enable compass").on_press(Message::EnableCompass))
        }
    };

    let heading = match state.heading {
        Some(bearing) => format!("Heading {}", format_heading(bearing)),
        None => "No heading".to_string(),
    };

    let mut bar = row![
        add("+ Spot", PlacementMode::Location),
        add("+ Prospect", PlacementMode::Prospect),
        horizontal_space(),
        text(state.sync.unwrap_or_default()).size(13),
        text(heading).size(13),
        text(format!("Map {:.0}°", state.map_bearing)).size(13),
        rotate("⟲", -ROTATE_STEP),
        rotate("⟳", ROTATE_STEP),
        button("N").on_press(Message::ResetNorth),
        button("-").on_press(Message::Viewport(ViewportEvent::Zoom(-1.0))),
        button("+").on_press(Message::Viewport(ViewportEvent::Zoom(1.0))),
        button("Centre on me").on_press_maybe(state.has_fix.then_some(Message::CenterOnMe)),
    ]
    .spacing(8)
    .padding(8)
    .align_y(Alignment::Center);

    if let Some(compass) = compass {
        bar = bar.push(compass);
    }
    bar.into()
}

/// The one notice on screen, stamped so a replaced notice gets a fresh timer
#[derive(Debug, Default)]
pub struct Notice {
    text: Option<String>,
    generation: u64,
}

impl Notice {
    pub fn show(&mut self, text: String) {
        self.generation += 1;
        self.text = Some(text);
    }

    pub fn dismiss(&mut self) {
        self.text = None;
    }

    /// A timer ran out; only the notice it was started for goes away
    pub fn expire(&mut self, generation: u64) {
        if generation == self.generation {
            self.text = None;
        }
    }

    pub fn current(&self) -> Option<(&str, u64)> {
        self.text.as_deref().map(|text| (text, self.generation))
    }
}

/// Transient message strip
pub fn notice(message: &str) -> Element<'_, Message> {
    container(
        row![
            text(message),
            horizontal_space(),
            button("Dismiss")
                .on_press(Message::DismissNotice)
                .style(button::text),
        ]
        .align_y(Alignment::Center),
    )
    .padding(8)
    .width(Length::Fill)
    .style(container::rounded_box)
    .into()
}
