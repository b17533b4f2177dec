//! Command handlers for the GuideSession

use super::{Command, GuideSession};
use crate::domain::error::CommandError;
use crate::domain::types::{TargetId, WalkId};
use tracing::{debug, info};

impl GuideSession {
    /// Carry out a user command. Refusals are published as `Rejected`.
    pub fn handle_command(&mut self, command: Command) {
        let name = command.as_str();
        debug!(command = %name, "command_received");

        let result = match command {
            Command::StartWalk(walk_id) => self.handle_start_walk(&walk_id),
            Command::Acknowledge => self.handle_acknowledge(),
            Command::Advance => self.handle_advance(),
            Command::EndWalk => {
                self.handle_end_walk();
                Ok(())
            }
            Command::Filter { search, category } => {
                self.handle_filter(&search, &category);
                Ok(())
            }
            Command::Nearby => {
                self.handle_nearby();
                Ok(())
            }
            Command::OpenStory(id) => self.handle_open_story(&id),
            Command::Status => {
                self.notifier.snapshot(self.snapshot());
                Ok(())
            }
        };

        self.metrics.record_command(result.is_err());
        if let Err(e) = result {
            info!(command = %name, kind = %e.kind(), error = %e, "command_rejected");
            self.notifier.rejected(name, e.kind(), e.to_string());
        }
    }

    fn handle_start_walk(&mut self, walk_id: &WalkId) -> Result<(), CommandError> {
        let notices = self.walks.start(walk_id, &self.catalog)?;
        self.publish_walk(notices);
        Ok(())
    }

    fn handle_acknowledge(&mut self) -> Result<(), CommandError> {
        let origin = self.origin();
        let notices = self.walks.acknowledge(&self.catalog, origin)?;
        self.publish_walk(notices);
        Ok(())
    }

    fn handle_advance(&mut self) -> Result<(), CommandError> {
        let origin = self.origin();
        let notices = self.walks.advance(&self.catalog, origin)?;
        self.publish_walk(notices);
        Ok(())
    }

    fn handle_end_walk(&mut self) {
        let notices = self.walks.end();
        self.publish_walk(notices);
    }

    fn handle_filter(&self, search: &str, category: &str) {
        let stories = self.catalog.views(self.catalog.filter(search, category));
        debug!(search = %search, category = %category, matches = %stories.len(), "stories_filtered");
        let query = match (search.trim().is_empty(), category.trim().is_empty()) {
            (true, true) => "all".to_string(),
            (false, true) => format!("search:{}", search.trim()),
            (true, false) => format!("category:{}", category.trim()),
            (false, false) => format!("search:{} category:{}", search.trim(), category.trim()),
        };
        self.notifier.stories(query, stories);
    }

    fn handle_nearby(&self) {
        let stories = self.catalog.views(self.catalog.proximity_order(self.origin()));
        self.notifier.stories("nearby", stories);
    }

    fn handle_open_story(&self, id: &TargetId) -> Result<(), CommandError> {
        let target = self.catalog.open_story(id)?;
        info!(story_id = %id, "story_opened");
        self.notifier.story(target);
        Ok(())
    }
}
