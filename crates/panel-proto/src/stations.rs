use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    name: String,
    url: String,
}

impl Station {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Ordered station list backed by an extended M3U file.  A station's identity
/// is its position in the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationList {
    stations: Vec<Station>,
}

const M3U_HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";

impl StationList {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn all(&self) -> &[Station] {
        &self.stations
    }

    pub fn get(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn add(&mut self, station: Station) {
        self.stations.push(station);
    }

    pub fn update(&mut self, index: usize, station: Station) -> bool {
        match self.stations.get_mut(index) {
            Some(slot) => {
                *slot = station;
                true
            }
            None => false,
        }
    }

    /// Removes the station and shifts the following ones down by one.
    pub fn remove(&mut self, index: usize) -> Option<Station> {
        (index < self.stations.len()).then(|| self.stations.remove(index))
    }

    /// Parse an extended M3U document.  Only entries with an `#EXTINF` line
    /// followed by a URL line are kept; a document without the `#EXTM3U`
    /// header is rejected.
    pub fn parse_m3u(content: &str) -> anyhow::Result<Self> {
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

        match lines.next() {
            Some(first) if first.starts_with(M3U_HEADER) => {}
            _ => anyhow::bail!("not an extended M3U playlist (missing {})", M3U_HEADER),
        }

        let mut stations = Vec::new();
        let mut pending_name: Option<String> = None;

        for line in lines {
            if let Some(rest) = line.strip_prefix(EXTINF) {
                pending_name = rest
                    .split_once(',')
                    .map(|(_, name)| name.trim().to_string());
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            if let Some(name) = pending_name.take() {
                stations.push(Station::new(name, line));
            }
        }

        Ok(Self { stations })
    }

    pub fn to_m3u(&self) -> String {
        let mut out = String::from(M3U_HEADER);
        out.push('\n');
        for station in &self.stations {
            out.push_str(&format!("{}-1,{}\n{}\n", EXTINF, station.name, station.url));
        }
        out
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_m3u(&content)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_m3u())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#EXTM3U\n\
        #EXTINF:-1,Radio Paradise\n\
        http://stream.radioparadise.com/mp3-192\n\
        \n\
        #EXTINF:-1,SomaFM Groove Salad\r\n\
        https://ice1.somafm.com/groovesalad-128-mp3\r\n\
        # a comment\n\
        http://orphan.example/stream\n";

    #[test]
    fn test_parse_m3u() {
        let list = StationList::parse_m3u(SAMPLE).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).unwrap().name(), "Radio Paradise");
        assert_eq!(
            list.get(1).unwrap().url(),
            "https://ice1.somafm.com/groovesalad-128-mp3"
        );
        assert!(list.get(2).is_none());
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(StationList::parse_m3u("#EXTINF:-1,A\nhttp://a\n").is_err());
        assert!(StationList::parse_m3u("").is_err());
    }

    #[test]
    fn test_edit_operations() {
        let mut list = StationList::parse_m3u(SAMPLE).unwrap();
        list.add(Station::new("FIP", "http://icecast.radiofrance.fr/fip-midfi.mp3"));
        assert!(list.update(0, Station::new("RP", "http://rp")));
        assert!(!list.update(9, Station::new("x", "y")));
        assert_eq!(list.remove(1).unwrap().name(), "SomaFM Groove Salad");
        assert_eq!(list.remove(5), None);
        let names: Vec<_> = list.all().iter().map(Station::name).collect();
        assert_eq!(names, ["RP", "FIP"]);
    }
}
