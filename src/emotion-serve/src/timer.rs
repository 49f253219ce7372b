use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

/// Wall-clock timer around one stage of the analysis pipeline.
pub struct Timer {
    stage: String,
    started: DateTime<Utc>,
}

impl Timer {
    /// Start timing `stage`
    pub fn start(stage: &str) -> Self {
        debug!("{}: starting", stage);

        Timer {
            stage: stage.to_owned(),
            started: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        Utc::now() - self.started
    }

    /// Stop the timer, log and return the stage duration in milliseconds
    pub fn stop(self) -> i64 {
        let msec = self.elapsed().num_milliseconds();
        info!("{} duration: {} msec", self.stage, msec);
        msec
    }
}
