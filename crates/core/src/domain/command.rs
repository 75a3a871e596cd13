pub const SAVED_REPLY_PREFIX: &str = ".add-saved-reply";

pub const SAVED_REPLY_USAGE: &str = "Sorry, I didn't understand that. The usage for \
.add-saved-reply is: .add-saved-reply question | answer";

/// What the bot was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    AddSavedReply,
    Question,
}

pub fn classify_command(text: &str) -> BotCommand {
    if text.to_lowercase().starts_with(SAVED_REPLY_PREFIX) {
        BotCommand::AddSavedReply
    } else {
        BotCommand::Question
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SavedReplyCommand {
    Parsed { question: String, answer: String },
    Malformed,
}

/// Parses `.add-saved-reply <question> | <answer>`.
///
/// The prefix match here is exact-case: an upper-case command is routed to
/// the saved-reply handler but reported back as malformed.
pub fn parse_saved_reply(text: &str) -> SavedReplyCommand {
    let Some(body) = text.split(SAVED_REPLY_PREFIX).nth(1) else {
        return SavedReplyCommand::Malformed;
    };
    let Some((question, answer)) = body.split_once('|') else {
        return SavedReplyCommand::Malformed;
    };

    SavedReplyCommand::Parsed {
        question: question.trim().to_owned(),
        answer: answer.trim().to_owned(),
    }
}
