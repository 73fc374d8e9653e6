/// Creation forms for a pending placement
use iced::widget::{button, column, pick_list, row, text, text_input, Column};
use iced::{Element, Length};
use iced_aw::Wrap;
use tracing::debug;

use crate::map::popup::{format_heading, format_position, Precision};
use crate::state::data::{LocationType, MAX_PHOTOS};
use crate::state::edit::{LocationDraft, LocationEdit, ProspectDraft, PREDEFINED_TAGS};
use crate::state::placement::{Pending, PlacementForm, PlacementWorkflow};
use crate::Message;

/// One edit to the open form
#[derive(Debug, Clone)]
pub enum FormEdit {
    Title(String),
    Kind(LocationType),
    City(String),
    Description(String),
    ToggleTag(String),
    TagInput(String),
    CommitTag,
    RemovePhoto(usize),
    Notes(String),
    ProspectCity(String),
}

impl FormEdit {
    /// Apply to the open form; false when no editable form of the right kind is open
    pub fn apply(self, workflow: &mut PlacementWorkflow) -> bool {
        match self {
            FormEdit::Notes(notes) => workflow.prospect_form_mut().map(|d| d.notes = notes),
            FormEdit::ProspectCity(city) => workflow.prospect_form_mut().map(|d| d.city = city),
            edit => workflow
                .location_form_mut()
                .map(|draft| edit.apply_to_location(draft)),
        }
        .inspect(|_| debug!("form edited"))
        .is_some()
    }

    /// Apply to a Location draft; Prospect-only edits do nothing
    pub fn apply_to_location(self, draft: &mut LocationDraft) {
        match self {
            FormEdit::Title(title) => draft.title = title,
            FormEdit::Kind(kind) => draft.kind = kind,
            FormEdit::City(city) => draft.city = city,
            FormEdit::Description(description) => draft.description = description,
            FormEdit::ToggleTag(tag) => draft.toggle_tag(&tag),
            FormEdit::TagInput(input) => draft.tag_input = input,
            FormEdit::CommitTag => draft.commit_tag_input(),
            FormEdit::RemovePhoto(index) => draft.remove_photo(index),
            FormEdit::Notes(_) | FormEdit::ProspectCity(_) => {}
        }
    }
}

fn edit(f: fn(String) -> FormEdit) -> impl Fn(String) -> Message {
    move |value| Message::Form(f(value))
}

/// Side panel for the pending placement
pub fn view<'a>(pending: &'a Pending, form_error: Option<&'a str>, attaching: bool) -> Element<'a, Message> {
    let coordinates = text(format_position(pending.placement.position, Precision::Full)).size(12);

    let body = match &pending.form {
        PlacementForm::Location(draft) => {
            location_form("New graffiti spot", draft, pending.submitting, attaching)
        }
        PlacementForm::Prospect(draft) => prospect_form(draft, pending.submitting),
    };

    let mut content = column![body, coordinates].spacing(12);
    if let Some(error) = form_error.or(pending.last_error.as_deref()) {
        content = content.push(text(error).style(text::danger));
    }

    let save = button(text(if pending.submitting { "Saving..." } else { "Save" }))
        .on_press_maybe((!pending.submitting).then_some(Message::Submit))
        .style(button::primary);
    // cancel stays available while a save is in flight
    let cancel = button("Cancel").on_press(Message::Cancel).style(button::secondary);

    content
        .push(row![save, cancel].spacing(8))
        .padding(16)
        .width(Length::Fixed(340.0))
        .into()
}

/// Side panel for editing a saved Location
pub fn edit_view<'a>(edit: &'a LocationEdit, attaching: bool) -> Element<'a, Message> {
    let mut content = column![location_form("Edit spot", &edit.draft, edit.saving, attaching)].spacing(12);
    if let Some(error) = &edit.error {
        content = content.push(text(error).style(text::danger));
    }

    let save = button(text(if edit.saving { "Saving..." } else { "Save" }))
        .on_press_maybe((!edit.saving && edit.is_modified()).then_some(Message::SaveEdit))
        .style(button::primary);
    let cancel = button("Cancel").on_press(Message::CancelEdit).style(button::secondary);

    content
        .push(row![save, cancel].spacing(8))
        .padding(16)
        .width(Length::Fixed(340.0))
        .into()
}

fn location_form<'a>(
    heading: &'a str,
    draft: &'a LocationDraft,
    submitting: bool,
    attaching: bool,
) -> Element<'a, Message> {
    let title = text_input("Title (required)", &draft.title)
        .on_input_maybe((!submitting).then_some(edit(FormEdit::Title)));
    let kind = pick_list(LocationType::ALL, Some(draft.kind), |kind| {
        Message::Form(FormEdit::Kind(kind))
    });
    let city = text_input("City", &draft.city)
        .on_input_maybe((!submitting).then_some(edit(FormEdit::City)));
    let description = text_input("Description", &draft.description)
        .on_input_maybe((!submitting).then_some(edit(FormEdit::Description)));

    // predefined chips first, then custom tags in the order they were added
    let custom = draft
        .tags
        .iter()
        .filter(|tag| !PREDEFINED_TAGS.contains(&tag.as_str()))
        .map(String::as_str);
    let chips: Vec<Element<'_, Message>> = PREDEFINED_TAGS
        .into_iter()
        .chain(custom)
        .map(|tag| {
            let selected = draft.tags.iter().any(|t| t == tag);
            button(text(tag.to_string()).size(12))
                .on_press(Message::Form(FormEdit::ToggleTag(tag.to_string())))
                .style(if selected { button::primary } else { button::secondary })
                .into()
        })
        .collect();
    let tag_input = text_input("Custom tag", &draft.tag_input)
        .on_input(edit(FormEdit::TagInput))
        .on_submit(Message::Form(FormEdit::CommitTag));

    let photos = draft.photos.iter().enumerate().fold(
        Column::new().spacing(4),
        |list, (i, photo)| {
            list.push(
                row![
                    text(format!("Photo {} - {}", i + 1, format_heading(photo.heading))).size(12),
                    button(text("Remove").size(12))
                        .on_press(Message::Form(FormEdit::RemovePhoto(i)))
                        .style(button::text),
                ]
                .spacing(8),
            )
        },
    );
    let add_photo = button(text(if attaching { "Uploading..." } else { "Add photo" }))
        .on_press_maybe(
            (draft.can_attach_photo() && !attaching && !submitting).then_some(Message::PickPhoto),
        )
        .style(button::secondary);

    column![
        text(heading).size(20),
        title,
        kind,
        city,
        description,
        text("Tags").size(14),
        Wrap::with_elements(chips).spacing(6.0).line_spacing(6.0),
        tag_input,
        text(format!("Photos ({}/{MAX_PHOTOS})", draft.photos.len())).size(14),
        photos,
        add_photo,
    ]
    .spacing(8)
    .into()
}

fn prospect_form(draft: &ProspectDraft, submitting: bool) -> Element<'_, Message> {
    column![
        text("New prospect").size(20),
        text_input("Notes", &draft.notes)
            .on_input_maybe((!submitting).then_some(edit(FormEdit::Notes))),
        text_input("City", &draft.city)
            .on_input_maybe((!submitting).then_some(edit(FormEdit::ProspectCity))),
    ]
    .spacing(8)
    .into()
}
