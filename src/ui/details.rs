/// Details panels for a selected Location or Prospect
use chrono::Utc;
use iced::widget::{button, column, image, row, text, Column};
use iced::{Element, Length};
use reqwest::Url;
use std::path::PathBuf;

use crate::map::popup::{format_position, GalleryPhoto, LocationDetails, Precision};
use crate::share;
use crate::state::data::{Location, Prospect};
use crate::state::store::EntityKind;
use crate::Message;

/// Local file behind a `file://` photo URI
fn local_file(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok()?.to_file_path().ok()
}

pub fn location<'a>(location: &'a Location, share_base: &str) -> Element<'a, Message> {
    let details = LocationDetails::new(location, Utc::now());

    let mut content = column![
        text(details.title).size(22),
        text(format!("{} - {}", details.kind, details.created)).size(13),
        text(details.place).size(13),
    ]
    .spacing(8);

    if let Some(city) = details.city {
        content = content.push(text(city).size(13));
    }
    if let Some(description) = details.description {
        content = content.push(text(description));
    }
    if let Some(tags) = details.tags {
        content = content.push(text(format!("Tags: {}", tags.join(", "))).size(13));
    }
    if let Some(gallery) = details.gallery {
        let photos = gallery
            .into_iter()
            .fold(Column::new().spacing(8), |list, entry| list.push(photo(entry)));
        content = content.push(photos);
    }
    content = content.push(text(details.coordinates).size(11));

    let link = share::share_url(share_base, location);
    let actions = column![
        row![
            button("Copy link").on_press(Message::Copy {
                contents: link.clone(),
                notice: "Link copied".into(),
            }),
            button("Share").on_press(Message::Copy {
                contents: format!("{}\n{}", share::share_text(location), link),
                notice: "Share text copied".into(),
            }),
            button("Directions").on_press(Message::Copy {
                contents: share::directions_url(location.position),
                notice: "Directions link copied".into(),
            }),
        ]
        .spacing(8),
        row![
            button("Edit").on_press(Message::EditLocation(location.id.clone())),
            button("Export").on_press(Message::Export(location.id.clone())),
            button("Delete")
                .on_press(Message::Delete(EntityKind::Location, location.id.clone()))
                .style(button::danger),
            button("Close")
                .on_press(Message::CloseDetails)
                .style(button::secondary),
        ]
        .spacing(8),
    ]
    .spacing(8);

    content
        .push(actions)
        .padding(16)
        .width(Length::Fixed(340.0))
        .into()
}

/// Picture for local files, the bare URI otherwise
fn photo(entry: GalleryPhoto) -> Element<'static, Message> {
    let picture: Element<'static, Message> = match local_file(&entry.uri) {
        Some(path) => image(path).width(Length::Fill).into(),
        None => text(entry.uri).size(11).into(),
    };
    match entry.heading {
        Some(heading) => column![picture, text(format!("Facing {heading}")).size(12)]
            .spacing(2)
            .into(),
        None => picture,
    }
}

pub fn prospect(prospect: &Prospect) -> Element<'_, Message> {
    let mut content = column![text("Prospect").size(22)].spacing(8);
    if let Some(city) = &prospect.city {
        content = content.push(text(city).size(13));
    }
    if let Some(notes) = &prospect.notes {
        content = content.push(text(notes));
    }

    content
        .push(text(format_position(prospect.position, Precision::Full)).size(11))
        .push(
            row![
                button("Delete")
                    .on_press(Message::Delete(EntityKind::Prospect, prospect.id.clone()))
                    .style(button::danger),
                button("Close")
                    .on_press(Message::CloseDetails)
                    .style(button::secondary),
            ]
            .spacing(8),
        )
        .padding(16)
        .width(Length::Fixed(340.0))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_file_uris_are_local() {
        assert_eq!(
            local_file("file:///tmp/photos/a.jpg"),
            Some(PathBuf::from("/tmp/photos/a.jpg"))
        );
        assert_eq!(local_file("https://cdn.example.com/a.jpg"), None);
        assert_eq!(local_file("not a uri"), None);
    }
}
