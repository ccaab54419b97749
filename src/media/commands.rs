/// Engine argument list with a human-readable description for logging.
///
/// Arguments reference virtual file names, never host paths; the engine
/// resolves them inside its private workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input(self, name: &str) -> Self {
        self.arg("-i").arg(name)
    }

    /// Add output file
    pub fn output(self, name: &str) -> Self {
        self.arg(name)
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set subtitle codec
    pub fn subtitle_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:s").arg(codec)
    }

    /// Copy video stream
    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Add a multi-input filter graph
    pub fn filter_complex<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    /// Tag the first subtitle stream's language
    pub fn subtitle_language(self, language: &str) -> Self {
        self.arg("-metadata:s:s:0").arg(format!("language={}", language))
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}
