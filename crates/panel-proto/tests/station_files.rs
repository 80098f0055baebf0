use panel_proto::state::PersistedState;
use panel_proto::stations::{Station, StationList};

#[test]
fn edited_playlist_is_readable_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("playlist").join("radio.m3u");

    let mut list = StationList::default();
    list.add(Station::new("Radio Paradise", "http://stream.radioparadise.com/mp3-192"));
    list.add(Station::new("FIP", "http://icecast.radiofrance.fr/fip-midfi.mp3"));
    list.save(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("#EXTM3U\n#EXTINF:-1,Radio Paradise\n"));

    let loaded = StationList::load(&path).unwrap();
    assert_eq!(loaded, list);
}

#[test]
fn missing_playlist_is_an_error_but_missing_state_is_not() {
    let dir = tempfile::tempdir().unwrap();
    assert!(StationList::load(&dir.path().join("nope.m3u")).is_err());
    assert!(PersistedState::load(&dir.path().join("nope.txt")).is_none());
}

#[test]
fn state_file_written_by_hand_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("current_state.txt");
    std::fs::write(&path, "4:60\n").unwrap();
    let state = PersistedState::load(&path).unwrap();
    assert_eq!(state.station_index, 4);
    assert_eq!(state.volume, 60);
}
