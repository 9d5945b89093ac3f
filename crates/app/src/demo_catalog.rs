use literacy_core::model::{ActionItem, Category, LessonDefinition, LessonDefinitionError, Step};

/// A small catalog covering every category, used by `seed`.
pub fn lessons() -> Result<Vec<LessonDefinition>, LessonDefinitionError> {
    Ok(vec![
        LessonDefinition::new(
            "unlock-phone",
            Category::Smartphone,
            "Unlocking your phone",
            vec![
                Step::new(
                    "wake",
                    "Wake the screen",
                    vec![
                        ActionItem::required("press-side", "Press the side button once"),
                        ActionItem::optional("raise-to-wake", "Try lifting the phone instead"),
                    ],
                ),
                Step::new(
                    "passcode",
                    "Enter your passcode",
                    vec![ActionItem::required("type-code", "Type your passcode")],
                ),
            ],
        )?,
        LessonDefinition::new(
            "adjust-text-size",
            Category::Smartphone,
            "Making text bigger",
            vec![Step::new(
                "display",
                "Open display settings",
                vec![
                    ActionItem::required("open-settings", "Open Settings"),
                    ActionItem::required("text-size", "Drag the text size slider"),
                ],
            )],
        )?,
        LessonDefinition::new(
            "web-search",
            Category::Internet,
            "Searching the web",
            vec![
                Step::new(
                    "open-browser",
                    "Open the browser",
                    vec![ActionItem::required("tap-browser", "Tap the browser icon")],
                ),
                Step::new(
                    "search",
                    "Search for something",
                    vec![
                        ActionItem::required("type-query", "Type a question in the search bar"),
                        ActionItem::optional("voice-search", "Try the microphone button"),
                    ],
                ),
            ],
        )?,
        LessonDefinition::new(
            "video-call",
            Category::Communication,
            "Making a video call",
            vec![
                Step::new(
                    "pick-contact",
                    "Pick who to call",
                    vec![ActionItem::required("open-contact", "Open a contact")],
                ),
                Step::new(
                    "start-call",
                    "Start the call",
                    vec![
                        ActionItem::required("press-camera", "Press the camera button"),
                        ActionItem::optional("flip-camera", "Switch to the back camera"),
                    ],
                ),
                Step::new("wave", "Say hello", vec![]),
            ],
        )?,
        LessonDefinition::new(
            "spot-scams",
            Category::Safety,
            "Spotting scam messages",
            vec![Step::new(
                "warning-signs",
                "Look for warning signs",
                vec![
                    ActionItem::required("urgent-language", "Notice pressure to act quickly"),
                    ActionItem::required("odd-sender", "Check who sent the message"),
                    ActionItem::optional("report", "Report the message as junk"),
                ],
            )],
        )?,
    ])
}
