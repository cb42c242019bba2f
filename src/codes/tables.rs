//! Static evdev code tables.
//!
//! Names follow `linux/input-event-codes.h`. Where the kernel header aliases
//! several names to one value, the generic name comes first and the last
//! listed name wins for lookups.

/// `EV_SYN` codes.
pub(crate) static SYNC: &[(u16, &str)] = &[
    (0x000, "SYN_REPORT"),
    (0x001, "SYN_CONFIG"),
    (0x002, "SYN_MT_REPORT"),
    (0x003, "SYN_DROPPED"),
    (0x00f, "SYN_MAX"),
    (0x010, "SYN_CNT"),
];

/// `EV_KEY` codes (keys and buttons).
pub(crate) static KEYS: &[(u16, &str)] = &[
    (0x000, "KEY_RESERVED"),
    (0x001, "KEY_ESC"),
    (0x002, "KEY_1"),
    (0x003, "KEY_2"),
    (0x004, "KEY_3"),
    (0x005, "KEY_4"),
    (0x006, "KEY_5"),
    (0x007, "KEY_6"),
    (0x008, "KEY_7"),
    (0x009, "KEY_8"),
    (0x00a, "KEY_9"),
    (0x00b, "KEY_0"),
    (0x00c, "KEY_MINUS"),
    (0x00d, "KEY_EQUAL"),
    (0x00e, "KEY_BACKSPACE"),
    (0x00f, "KEY_TAB"),
    (0x010, "KEY_Q"),
    (0x011, "KEY_W"),
    (0x012, "KEY_E"),
    (0x013, "KEY_R"),
    (0x014, "KEY_T"),
    (0x015, "KEY_Y"),
    (0x016, "KEY_U"),
    (0x017, "KEY_I"),
    (0x018, "KEY_O"),
    (0x019, "KEY_P"),
    (0x01a, "KEY_LEFTBRACE"),
    (0x01b, "KEY_RIGHTBRACE"),
    (0x01c, "KEY_ENTER"),
    (0x01d, "KEY_LEFTCTRL"),
    (0x01e, "KEY_A"),
    (0x01f, "KEY_S"),
    (0x020, "KEY_D"),
    (0x021, "KEY_F"),
    (0x022, "KEY_G"),
    (0x023, "KEY_H"),
    (0x024, "KEY_J"),
    (0x025, "KEY_K"),
    (0x026, "KEY_L"),
    (0x027, "KEY_SEMICOLON"),
    (0x028, "KEY_APOSTROPHE"),
    (0x029, "KEY_GRAVE"),
    (0x02a, "KEY_LEFTSHIFT"),
    (0x02b, "KEY_BACKSLASH"),
    (0x02c, "KEY_Z"),
    (0x02d, "KEY_X"),
    (0x02e, "KEY_C"),
    (0x02f, "KEY_V"),
    (0x030, "KEY_B"),
    (0x031, "KEY_N"),
    (0x032, "KEY_M"),
    (0x033, "KEY_COMMA"),
    (0x034, "KEY_DOT"),
    (0x035, "KEY_SLASH"),
    (0x036, "KEY_RIGHTSHIFT"),
    (0x037, "KEY_KPASTERISK"),
    (0x038, "KEY_LEFTALT"),
    (0x039, "KEY_SPACE"),
    (0x03a, "KEY_CAPSLOCK"),
    (0x03b, "KEY_F1"),
    (0x03c, "KEY_F2"),
    (0x03d, "KEY_F3"),
    (0x03e, "KEY_F4"),
    (0x03f, "KEY_F5"),
    (0x040, "KEY_F6"),
    (0x041, "KEY_F7"),
    (0x042, "KEY_F8"),
    (0x043, "KEY_F9"),
    (0x044, "KEY_F10"),
    (0x045, "KEY_NUMLOCK"),
    (0x046, "KEY_SCROLLLOCK"),
    (0x047, "KEY_KP7"),
    (0x048, "KEY_KP8"),
    (0x049, "KEY_KP9"),
    (0x04a, "KEY_KPMINUS"),
    (0x04b, "KEY_KP4"),
    (0x04c, "KEY_KP5"),
    (0x04d, "KEY_KP6"),
    (0x04e, "KEY_KPPLUS"),
    (0x04f, "KEY_KP1"),
    (0x050, "KEY_KP2"),
    (0x051, "KEY_KP3"),
    (0x052, "KEY_KP0"),
    (0x053, "KEY_KPDOT"),
    (0x055, "KEY_ZENKAKUHANKAKU"),
    (0x056, "KEY_102ND"),
    (0x057, "KEY_F11"),
    (0x058, "KEY_F12"),
    (0x059, "KEY_RO"),
    (0x05a, "KEY_KATAKANA"),
    (0x05b, "KEY_HIRAGANA"),
    (0x05c, "KEY_HENKAN"),
    (0x05d, "KEY_KATAKANAHIRAGANA"),
    (0x05e, "KEY_MUHENKAN"),
    (0x05f, "KEY_KPJPCOMMA"),
    (0x060, "KEY_KPENTER"),
    (0x061, "KEY_RIGHTCTRL"),
    (0x062, "KEY_KPSLASH"),
    (0x063, "KEY_SYSRQ"),
    (0x064, "KEY_RIGHTALT"),
    (0x065, "KEY_LINEFEED"),
    (0x066, "KEY_HOME"),
    (0x067, "KEY_UP"),
    (0x068, "KEY_PAGEUP"),
    (0x069, "KEY_LEFT"),
    (0x06a, "KEY_RIGHT"),
    (0x06b, "KEY_END"),
    (0x06c, "KEY_DOWN"),
    (0x06d, "KEY_PAGEDOWN"),
    (0x06e, "KEY_INSERT"),
    (0x06f, "KEY_DELETE"),
    (0x070, "KEY_MACRO"),
    (0x071, "KEY_MUTE"),
    (0x072, "KEY_VOLUMEDOWN"),
    (0x073, "KEY_VOLUMEUP"),
    (0x074, "KEY_POWER"),
    (0x075, "KEY_KPEQUAL"),
    (0x076, "KEY_KPPLUSMINUS"),
    (0x077, "KEY_PAUSE"),
    (0x078, "KEY_SCALE"),
    (0x079, "KEY_KPCOMMA"),
    (0x07a, "KEY_HANGEUL"),
    (0x07b, "KEY_HANJA"),
    (0x07c, "KEY_YEN"),
    (0x07d, "KEY_LEFTMETA"),
    (0x07e, "KEY_RIGHTMETA"),
    (0x07f, "KEY_COMPOSE"),
    (0x080, "KEY_STOP"),
    (0x081, "KEY_AGAIN"),
    (0x082, "KEY_PROPS"),
    (0x083, "KEY_UNDO"),
    (0x084, "KEY_FRONT"),
    (0x085, "KEY_COPY"),
    (0x086, "KEY_OPEN"),
    (0x087, "KEY_PASTE"),
    (0x088, "KEY_FIND"),
    (0x089, "KEY_CUT"),
    (0x08a, "KEY_HELP"),
    (0x08b, "KEY_MENU"),
    (0x08c, "KEY_CALC"),
    (0x08d, "KEY_SETUP"),
    (0x08e, "KEY_SLEEP"),
    (0x08f, "KEY_WAKEUP"),
    (0x090, "KEY_FILE"),
    (0x091, "KEY_SENDFILE"),
    (0x092, "KEY_DELETEFILE"),
    (0x093, "KEY_XFER"),
    (0x094, "KEY_PROG1"),
    (0x095, "KEY_PROG2"),
    (0x096, "KEY_WWW"),
    (0x097, "KEY_MSDOS"),
    (0x098, "KEY_COFFEE"),
    (0x099, "KEY_ROTATE_DISPLAY"),
    (0x09a, "KEY_CYCLEWINDOWS"),
    (0x09b, "KEY_MAIL"),
    (0x09c, "KEY_BOOKMARKS"),
    (0x09d, "KEY_COMPUTER"),
    (0x09e, "KEY_BACK"),
    (0x09f, "KEY_FORWARD"),
    (0x0a0, "KEY_CLOSECD"),
    (0x0a1, "KEY_EJECTCD"),
    (0x0a2, "KEY_EJECTCLOSECD"),
    (0x0a3, "KEY_NEXTSONG"),
    (0x0a4, "KEY_PLAYPAUSE"),
    (0x0a5, "KEY_PREVIOUSSONG"),
    (0x0a6, "KEY_STOPCD"),
    (0x0a7, "KEY_RECORD"),
    (0x0a8, "KEY_REWIND"),
    (0x0a9, "KEY_PHONE"),
    (0x0aa, "KEY_ISO"),
    (0x0ab, "KEY_CONFIG"),
    (0x0ac, "KEY_HOMEPAGE"),
    (0x0ad, "KEY_REFRESH"),
    (0x0ae, "KEY_EXIT"),
    (0x0af, "KEY_MOVE"),
    (0x0b0, "KEY_EDIT"),
    (0x0b1, "KEY_SCROLLUP"),
    (0x0b2, "KEY_SCROLLDOWN"),
    (0x0b3, "KEY_KPLEFTPAREN"),
    (0x0b4, "KEY_KPRIGHTPAREN"),
    (0x0b5, "KEY_NEW"),
    (0x0b6, "KEY_REDO"),
    (0x0b7, "KEY_F13"),
    (0x0b8, "KEY_F14"),
    (0x0b9, "KEY_F15"),
    (0x0ba, "KEY_F16"),
    (0x0bb, "KEY_F17"),
    (0x0bc, "KEY_F18"),
    (0x0bd, "KEY_F19"),
    (0x0be, "KEY_F20"),
    (0x0bf, "KEY_F21"),
    (0x0c0, "KEY_F22"),
    (0x0c1, "KEY_F23"),
    (0x0c2, "KEY_F24"),
    (0x0c8, "KEY_PLAYCD"),
    (0x0c9, "KEY_PAUSECD"),
    (0x0ca, "KEY_PROG3"),
    (0x0cb, "KEY_PROG4"),
    (0x0cc, "KEY_DASHBOARD"),
    (0x0cd, "KEY_SUSPEND"),
    (0x0ce, "KEY_CLOSE"),
    (0x0cf, "KEY_PLAY"),
    (0x0d0, "KEY_FASTFORWARD"),
    (0x0d1, "KEY_BASSBOOST"),
    (0x0d2, "KEY_PRINT"),
    (0x0d3, "KEY_HP"),
    (0x0d4, "KEY_CAMERA"),
    (0x0d5, "KEY_SOUND"),
    (0x0d6, "KEY_QUESTION"),
    (0x0d7, "KEY_EMAIL"),
    (0x0d8, "KEY_CHAT"),
    (0x0d9, "KEY_SEARCH"),
    (0x0da, "KEY_CONNECT"),
    (0x0db, "KEY_FINANCE"),
    (0x0dc, "KEY_SPORT"),
    (0x0dd, "KEY_SHOP"),
    (0x0de, "KEY_ALTERASE"),
    (0x0df, "KEY_CANCEL"),
    (0x0e0, "KEY_BRIGHTNESSDOWN"),
    (0x0e1, "KEY_BRIGHTNESSUP"),
    (0x0e2, "KEY_MEDIA"),
    (0x0e3, "KEY_SWITCHVIDEOMODE"),
    (0x0e4, "KEY_KBDILLUMTOGGLE"),
    (0x0e5, "KEY_KBDILLUMDOWN"),
    (0x0e6, "KEY_KBDILLUMUP"),
    (0x0e7, "KEY_SEND"),
    (0x0e8, "KEY_REPLY"),
    (0x0e9, "KEY_FORWARDMAIL"),
    (0x0ea, "KEY_SAVE"),
    (0x0eb, "KEY_DOCUMENTS"),
    (0x0ec, "KEY_BATTERY"),
    (0x0ed, "KEY_BLUETOOTH"),
    (0x0ee, "KEY_WLAN"),
    (0x0ef, "KEY_UWB"),
    (0x0f0, "KEY_UNKNOWN"),
    (0x0f1, "KEY_VIDEO_NEXT"),
    (0x0f2, "KEY_VIDEO_PREV"),
    (0x0f3, "KEY_BRIGHTNESS_CYCLE"),
    (0x0f4, "KEY_BRIGHTNESS_AUTO"),
    (0x0f5, "KEY_DISPLAY_OFF"),
    (0x0f6, "KEY_WWAN"),
    (0x0f7, "KEY_RFKILL"),
    (0x0f8, "KEY_MICMUTE"),
    (0x100, "BTN_MISC"),
    (0x100, "BTN_0"),
    (0x101, "BTN_1"),
    (0x102, "BTN_2"),
    (0x103, "BTN_3"),
    (0x104, "BTN_4"),
    (0x105, "BTN_5"),
    (0x106, "BTN_6"),
    (0x107, "BTN_7"),
    (0x108, "BTN_8"),
    (0x109, "BTN_9"),
    (0x110, "BTN_MOUSE"),
    (0x110, "BTN_LEFT"),
    (0x111, "BTN_RIGHT"),
    (0x112, "BTN_MIDDLE"),
    (0x113, "BTN_SIDE"),
    (0x114, "BTN_EXTRA"),
    (0x115, "BTN_FORWARD"),
    (0x116, "BTN_BACK"),
    (0x117, "BTN_TASK"),
    (0x120, "BTN_JOYSTICK"),
    (0x120, "BTN_TRIGGER"),
    (0x121, "BTN_THUMB"),
    (0x122, "BTN_THUMB2"),
    (0x123, "BTN_TOP"),
    (0x124, "BTN_TOP2"),
    (0x125, "BTN_PINKIE"),
    (0x126, "BTN_BASE"),
    (0x127, "BTN_BASE2"),
    (0x128, "BTN_BASE3"),
    (0x129, "BTN_BASE4"),
    (0x12a, "BTN_BASE5"),
    (0x12b, "BTN_BASE6"),
    (0x12f, "BTN_DEAD"),
    (0x130, "BTN_GAMEPAD"),
    (0x130, "BTN_SOUTH"),
    (0x131, "BTN_EAST"),
    (0x132, "BTN_C"),
    (0x133, "BTN_NORTH"),
    (0x134, "BTN_WEST"),
    (0x135, "BTN_Z"),
    (0x136, "BTN_TL"),
    (0x137, "BTN_TR"),
    (0x138, "BTN_TL2"),
    (0x139, "BTN_TR2"),
    (0x13a, "BTN_SELECT"),
    (0x13b, "BTN_START"),
    (0x13c, "BTN_MODE"),
    (0x13d, "BTN_THUMBL"),
    (0x13e, "BTN_THUMBR"),
    (0x140, "BTN_DIGI"),
    (0x140, "BTN_TOOL_PEN"),
    (0x141, "BTN_TOOL_RUBBER"),
    (0x142, "BTN_TOOL_BRUSH"),
    (0x143, "BTN_TOOL_PENCIL"),
    (0x144, "BTN_TOOL_AIRBRUSH"),
    (0x145, "BTN_TOOL_FINGER"),
    (0x146, "BTN_TOOL_MOUSE"),
    (0x147, "BTN_TOOL_LENS"),
    (0x148, "BTN_TOOL_QUINTTAP"),
    (0x14a, "BTN_TOUCH"),
    (0x14b, "BTN_STYLUS"),
    (0x14c, "BTN_STYLUS2"),
    (0x14d, "BTN_TOOL_DOUBLETAP"),
    (0x14e, "BTN_TOOL_TRIPLETAP"),
    (0x14f, "BTN_TOOL_QUADTAP"),
    (0x150, "BTN_WHEEL"),
    (0x150, "BTN_GEAR_DOWN"),
    (0x151, "BTN_GEAR_UP"),
    (0x160, "KEY_OK"),
    (0x161, "KEY_SELECT"),
    (0x162, "KEY_GOTO"),
    (0x163, "KEY_CLEAR"),
    (0x164, "KEY_POWER2"),
    (0x165, "KEY_OPTION"),
    (0x166, "KEY_INFO"),
    (0x167, "KEY_TIME"),
    (0x168, "KEY_VENDOR"),
    (0x169, "KEY_ARCHIVE"),
    (0x16a, "KEY_PROGRAM"),
    (0x16b, "KEY_CHANNEL"),
    (0x16c, "KEY_FAVORITES"),
    (0x16d, "KEY_EPG"),
    (0x16e, "KEY_PVR"),
    (0x16f, "KEY_MHP"),
    (0x170, "KEY_LANGUAGE"),
    (0x171, "KEY_TITLE"),
    (0x172, "KEY_SUBTITLE"),
    (0x173, "KEY_ANGLE"),
    (0x174, "KEY_ZOOM"),
    (0x175, "KEY_MODE"),
    (0x176, "KEY_KEYBOARD"),
    (0x177, "KEY_SCREEN"),
    (0x178, "KEY_PC"),
    (0x179, "KEY_TV"),
    (0x17a, "KEY_TV2"),
    (0x17b, "KEY_VCR"),
    (0x17c, "KEY_VCR2"),
    (0x17d, "KEY_SAT"),
    (0x17e, "KEY_SAT2"),
    (0x17f, "KEY_CD"),
    (0x180, "KEY_TAPE"),
    (0x181, "KEY_RADIO"),
    (0x182, "KEY_TUNER"),
    (0x183, "KEY_PLAYER"),
    (0x184, "KEY_TEXT"),
    (0x185, "KEY_DVD"),
    (0x186, "KEY_AUX"),
    (0x187, "KEY_MP3"),
    (0x188, "KEY_AUDIO"),
    (0x189, "KEY_VIDEO"),
    (0x18a, "KEY_DIRECTORY"),
    (0x18b, "KEY_LIST"),
    (0x18c, "KEY_MEMO"),
    (0x18d, "KEY_CALENDAR"),
    (0x18e, "KEY_RED"),
    (0x18f, "KEY_GREEN"),
    (0x190, "KEY_YELLOW"),
    (0x191, "KEY_BLUE"),
    (0x192, "KEY_CHANNELUP"),
    (0x193, "KEY_CHANNELDOWN"),
    (0x194, "KEY_FIRST"),
    (0x195, "KEY_LAST"),
    (0x196, "KEY_AB"),
    (0x197, "KEY_NEXT"),
    (0x198, "KEY_RESTART"),
    (0x199, "KEY_SLOW"),
    (0x19a, "KEY_SHUFFLE"),
    (0x19b, "KEY_BREAK"),
    (0x19c, "KEY_PREVIOUS"),
    (0x19d, "KEY_DIGITS"),
    (0x19e, "KEY_TEEN"),
    (0x19f, "KEY_TWEN"),
    (0x1a0, "KEY_VIDEOPHONE"),
    (0x1a1, "KEY_GAMES"),
    (0x1a2, "KEY_ZOOMIN"),
    (0x1a3, "KEY_ZOOMOUT"),
    (0x1a4, "KEY_ZOOMRESET"),
    (0x1a5, "KEY_WORDPROCESSOR"),
    (0x1a6, "KEY_EDITOR"),
    (0x1a7, "KEY_SPREADSHEET"),
    (0x1a8, "KEY_GRAPHICSEDITOR"),
    (0x1a9, "KEY_PRESENTATION"),
    (0x1aa, "KEY_DATABASE"),
    (0x1ab, "KEY_NEWS"),
    (0x1ac, "KEY_VOICEMAIL"),
    (0x1ad, "KEY_ADDRESSBOOK"),
    (0x1ae, "KEY_MESSENGER"),
    (0x1af, "KEY_DISPLAYTOGGLE"),
    (0x1b0, "KEY_SPELLCHECK"),
    (0x1b1, "KEY_LOGOFF"),
    (0x1b2, "KEY_DOLLAR"),
    (0x1b3, "KEY_EURO"),
    (0x1b4, "KEY_FRAMEBACK"),
    (0x1b5, "KEY_FRAMEFORWARD"),
    (0x1b6, "KEY_CONTEXT_MENU"),
    (0x1b7, "KEY_MEDIA_REPEAT"),
    (0x1b8, "KEY_10CHANNELSUP"),
    (0x1b9, "KEY_10CHANNELSDOWN"),
    (0x1ba, "KEY_IMAGES"),
    (0x1c0, "KEY_DEL_EOL"),
    (0x1c1, "KEY_DEL_EOS"),
    (0x1c2, "KEY_INS_LINE"),
    (0x1c3, "KEY_DEL_LINE"),
    (0x1d0, "KEY_FN"),
    (0x1d1, "KEY_FN_ESC"),
    (0x1d2, "KEY_FN_F1"),
    (0x1d3, "KEY_FN_F2"),
    (0x1d4, "KEY_FN_F3"),
    (0x1d5, "KEY_FN_F4"),
    (0x1d6, "KEY_FN_F5"),
    (0x1d7, "KEY_FN_F6"),
    (0x1d8, "KEY_FN_F7"),
    (0x1d9, "KEY_FN_F8"),
    (0x1da, "KEY_FN_F9"),
    (0x1db, "KEY_FN_F10"),
    (0x1dc, "KEY_FN_F11"),
    (0x1dd, "KEY_FN_F12"),
    (0x1de, "KEY_FN_1"),
    (0x1df, "KEY_FN_2"),
    (0x1e0, "KEY_FN_D"),
    (0x1e1, "KEY_FN_E"),
    (0x1e2, "KEY_FN_F"),
    (0x1e3, "KEY_FN_S"),
    (0x1e4, "KEY_FN_B"),
    (0x1f1, "KEY_BRL_DOT1"),
    (0x1f2, "KEY_BRL_DOT2"),
    (0x1f3, "KEY_BRL_DOT3"),
    (0x1f4, "KEY_BRL_DOT4"),
    (0x1f5, "KEY_BRL_DOT5"),
    (0x1f6, "KEY_BRL_DOT6"),
    (0x1f7, "KEY_BRL_DOT7"),
    (0x1f8, "KEY_BRL_DOT8"),
    (0x1f9, "KEY_BRL_DOT9"),
    (0x1fa, "KEY_BRL_DOT10"),
    (0x200, "KEY_NUMERIC_0"),
    (0x201, "KEY_NUMERIC_1"),
    (0x202, "KEY_NUMERIC_2"),
    (0x203, "KEY_NUMERIC_3"),
    (0x204, "KEY_NUMERIC_4"),
    (0x205, "KEY_NUMERIC_5"),
    (0x206, "KEY_NUMERIC_6"),
    (0x207, "KEY_NUMERIC_7"),
    (0x208, "KEY_NUMERIC_8"),
    (0x209, "KEY_NUMERIC_9"),
    (0x20a, "KEY_NUMERIC_STAR"),
    (0x20b, "KEY_NUMERIC_POUND"),
    (0x20c, "KEY_NUMERIC_A"),
    (0x20d, "KEY_NUMERIC_B"),
    (0x20e, "KEY_NUMERIC_C"),
    (0x20f, "KEY_NUMERIC_D"),
    (0x210, "KEY_CAMERA_FOCUS"),
    (0x211, "KEY_WPS_BUTTON"),
    (0x212, "KEY_TOUCHPAD_TOGGLE"),
    (0x213, "KEY_TOUCHPAD_ON"),
    (0x214, "KEY_TOUCHPAD_OFF"),
    (0x215, "KEY_CAMERA_ZOOMIN"),
    (0x216, "KEY_CAMERA_ZOOMOUT"),
    (0x217, "KEY_CAMERA_UP"),
    (0x218, "KEY_CAMERA_DOWN"),
    (0x219, "KEY_CAMERA_LEFT"),
    (0x21a, "KEY_CAMERA_RIGHT"),
    (0x21b, "KEY_ATTENDANT_ON"),
    (0x21c, "KEY_ATTENDANT_OFF"),
    (0x21d, "KEY_ATTENDANT_TOGGLE"),
    (0x21e, "KEY_LIGHTS_TOGGLE"),
    (0x220, "BTN_DPAD_UP"),
    (0x221, "BTN_DPAD_DOWN"),
    (0x222, "BTN_DPAD_LEFT"),
    (0x223, "BTN_DPAD_RIGHT"),
    (0x230, "KEY_ALS_TOGGLE"),
    (0x240, "KEY_BUTTONCONFIG"),
    (0x241, "KEY_TASKMANAGER"),
    (0x242, "KEY_JOURNAL"),
    (0x243, "KEY_CONTROLPANEL"),
    (0x244, "KEY_APPSELECT"),
    (0x245, "KEY_SCREENSAVER"),
    (0x246, "KEY_VOICECOMMAND"),
    (0x250, "KEY_BRIGHTNESS_MIN"),
    (0x251, "KEY_BRIGHTNESS_MAX"),
    (0x260, "KEY_KBDINPUTASSIST_PREV"),
    (0x261, "KEY_KBDINPUTASSIST_NEXT"),
    (0x262, "KEY_KBDINPUTASSIST_PREVGROUP"),
    (0x263, "KEY_KBDINPUTASSIST_NEXTGROUP"),
    (0x264, "KEY_KBDINPUTASSIST_ACCEPT"),
    (0x265, "KEY_KBDINPUTASSIST_CANCEL"),
    (0x2c0, "BTN_TRIGGER_HAPPY"),
    (0x2c0, "BTN_TRIGGER_HAPPY1"),
    (0x2c1, "BTN_TRIGGER_HAPPY2"),
    (0x2c2, "BTN_TRIGGER_HAPPY3"),
    (0x2c3, "BTN_TRIGGER_HAPPY4"),
    (0x2c4, "BTN_TRIGGER_HAPPY5"),
    (0x2c5, "BTN_TRIGGER_HAPPY6"),
    (0x2c6, "BTN_TRIGGER_HAPPY7"),
    (0x2c7, "BTN_TRIGGER_HAPPY8"),
    (0x2c8, "BTN_TRIGGER_HAPPY9"),
    (0x2c9, "BTN_TRIGGER_HAPPY10"),
    (0x2ca, "BTN_TRIGGER_HAPPY11"),
    (0x2cb, "BTN_TRIGGER_HAPPY12"),
    (0x2cc, "BTN_TRIGGER_HAPPY13"),
    (0x2cd, "BTN_TRIGGER_HAPPY14"),
    (0x2ce, "BTN_TRIGGER_HAPPY15"),
    (0x2cf, "BTN_TRIGGER_HAPPY16"),
    (0x2d0, "BTN_TRIGGER_HAPPY17"),
    (0x2d1, "BTN_TRIGGER_HAPPY18"),
    (0x2d2, "BTN_TRIGGER_HAPPY19"),
    (0x2d3, "BTN_TRIGGER_HAPPY20"),
    (0x2d4, "BTN_TRIGGER_HAPPY21"),
    (0x2d5, "BTN_TRIGGER_HAPPY22"),
    (0x2d6, "BTN_TRIGGER_HAPPY23"),
    (0x2d7, "BTN_TRIGGER_HAPPY24"),
    (0x2d8, "BTN_TRIGGER_HAPPY25"),
    (0x2d9, "BTN_TRIGGER_HAPPY26"),
    (0x2da, "BTN_TRIGGER_HAPPY27"),
    (0x2db, "BTN_TRIGGER_HAPPY28"),
    (0x2dc, "BTN_TRIGGER_HAPPY29"),
    (0x2dd, "BTN_TRIGGER_HAPPY30"),
    (0x2de, "BTN_TRIGGER_HAPPY31"),
    (0x2df, "BTN_TRIGGER_HAPPY32"),
    (0x2e0, "BTN_TRIGGER_HAPPY33"),
    (0x2e1, "BTN_TRIGGER_HAPPY34"),
    (0x2e2, "BTN_TRIGGER_HAPPY35"),
    (0x2e3, "BTN_TRIGGER_HAPPY36"),
    (0x2e4, "BTN_TRIGGER_HAPPY37"),
    (0x2e5, "BTN_TRIGGER_HAPPY38"),
    (0x2e6, "BTN_TRIGGER_HAPPY39"),
    (0x2e7, "BTN_TRIGGER_HAPPY40"),
    (0x2ff, "KEY_MAX"),
    (0x300, "KEY_CNT"),
];

/// `EV_REL` codes.
pub(crate) static RELATIVE: &[(u16, &str)] = &[
    (0x000, "REL_X"),
    (0x001, "REL_Y"),
    (0x002, "REL_Z"),
    (0x003, "REL_RX"),
    (0x004, "REL_RY"),
    (0x005, "REL_RZ"),
    (0x006, "REL_HWHEEL"),
    (0x007, "REL_DIAL"),
    (0x008, "REL_WHEEL"),
    (0x009, "REL_MISC"),
    (0x00f, "REL_MAX"),
    (0x010, "REL_CNT"),
];

/// `EV_ABS` codes.
pub(crate) static ABSOLUTE: &[(u16, &str)] = &[
    (0x000, "ABS_X"),
    (0x001, "ABS_Y"),
    (0x002, "ABS_Z"),
    (0x003, "ABS_RX"),
    (0x004, "ABS_RY"),
    (0x005, "ABS_RZ"),
    (0x006, "ABS_THROTTLE"),
    (0x007, "ABS_RUDDER"),
    (0x008, "ABS_WHEEL"),
    (0x009, "ABS_GAS"),
    (0x00a, "ABS_BRAKE"),
    (0x010, "ABS_HAT0X"),
    (0x011, "ABS_HAT0Y"),
    (0x012, "ABS_HAT1X"),
    (0x013, "ABS_HAT1Y"),
    (0x014, "ABS_HAT2X"),
    (0x015, "ABS_HAT2Y"),
    (0x016, "ABS_HAT3X"),
    (0x017, "ABS_HAT3Y"),
    (0x018, "ABS_PRESSURE"),
    (0x019, "ABS_DISTANCE"),
    (0x01a, "ABS_TILT_X"),
    (0x01b, "ABS_TILT_Y"),
    (0x01c, "ABS_TOOL_WIDTH"),
    (0x020, "ABS_VOLUME"),
    (0x028, "ABS_MISC"),
    (0x02f, "ABS_MT_SLOT"),
    (0x030, "ABS_MT_TOUCH_MAJOR"),
    (0x031, "ABS_MT_TOUCH_MINOR"),
    (0x032, "ABS_MT_WIDTH_MAJOR"),
    (0x033, "ABS_MT_WIDTH_MINOR"),
    (0x034, "ABS_MT_ORIENTATION"),
    (0x035, "ABS_MT_POSITION_X"),
    (0x036, "ABS_MT_POSITION_Y"),
    (0x037, "ABS_MT_TOOL_TYPE"),
    (0x038, "ABS_MT_BLOB_ID"),
    (0x039, "ABS_MT_TRACKING_ID"),
    (0x03a, "ABS_MT_PRESSURE"),
    (0x03b, "ABS_MT_DISTANCE"),
    (0x03c, "ABS_MT_TOOL_X"),
    (0x03d, "ABS_MT_TOOL_Y"),
    (0x03f, "ABS_MAX"),
    (0x040, "ABS_CNT"),
];

/// `EV_MSC` codes.
pub(crate) static MISC: &[(u16, &str)] = &[
    (0x000, "MSC_SERIAL"),
    (0x001, "MSC_PULSELED"),
    (0x002, "MSC_GESTURE"),
    (0x003, "MSC_RAW"),
    (0x004, "MSC_SCAN"),
    (0x005, "MSC_TIMESTAMP"),
    (0x007, "MSC_MAX"),
    (0x008, "MSC_CNT"),
];

/// `EV_SW` codes.
pub(crate) static SWITCH: &[(u16, &str)] = &[
    (0x000, "SW_LID"),
    (0x001, "SW_TABLET_MODE"),
    (0x002, "SW_HEADPHONE_INSERT"),
    (0x003, "SW_RFKILL_ALL"),
    (0x004, "SW_MICROPHONE_INSERT"),
    (0x005, "SW_DOCK"),
    (0x006, "SW_LINEOUT_INSERT"),
    (0x007, "SW_JACK_PHYSICAL_INSERT"),
    (0x008, "SW_VIDEOOUT_INSERT"),
    (0x009, "SW_CAMERA_LENS_COVER"),
    (0x00a, "SW_KEYPAD_SLIDE"),
    (0x00b, "SW_FRONT_PROXIMITY"),
    (0x00c, "SW_ROTATE_LOCK"),
    (0x00d, "SW_LINEIN_INSERT"),
    (0x00e, "SW_MUTE_DEVICE"),
    (0x00f, "SW_MAX"),
    (0x010, "SW_CNT"),
];

/// `EV_LED` codes.
pub(crate) static LEDS: &[(u16, &str)] = &[
    (0x000, "LED_NUML"),
    (0x001, "LED_CAPSL"),
    (0x002, "LED_SCROLLL"),
    (0x003, "LED_COMPOSE"),
    (0x004, "LED_KANA"),
    (0x005, "LED_SLEEP"),
    (0x006, "LED_SUSPEND"),
    (0x007, "LED_MUTE"),
    (0x008, "LED_MISC"),
    (0x009, "LED_MAIL"),
    (0x00a, "LED_CHARGING"),
    (0x00f, "LED_MAX"),
    (0x010, "LED_CNT"),
];

/// `EV_SND` codes.
pub(crate) static SOUNDS: &[(u16, &str)] = &[
    (0x000, "SND_CLICK"),
    (0x001, "SND_BELL"),
    (0x002, "SND_TONE"),
    (0x007, "SND_MAX"),
    (0x008, "SND_CNT"),
];

/// `EV_REP` codes.
pub(crate) static REPEAT: &[(u16, &str)] = &[
    (0x000, "REP_DELAY"),
    (0x001, "REP_PERIOD"),
    (0x001, "REP_MAX"),
    (0x002, "REP_CNT"),
];

/// Windows virtual-key code to evdev key code. Unmapped keys are absent.
pub(crate) static WINDOWS_VK: &[(u16, u16)] = &[
    (0x01, 0x110),
    (0x02, 0x111),
    (0x04, 0x112),
    (0x05, 0x113),
    (0x06, 0x114),
    (0x08, 0x00e),
    (0x09, 0x00f),
    (0x0c, 0x163),
    (0x0d, 0x01c),
    (0x10, 0x02a),
    (0x11, 0x01d),
    (0x12, 0x038),
    (0x13, 0x077),
    (0x14, 0x03a),
    (0x15, 0x05a),
    (0x17, 0x05c),
    (0x18, 0x05d),
    (0x19, 0x05e),
    (0x1b, 0x001),
    (0x20, 0x039),
    (0x21, 0x068),
    (0x22, 0x06d),
    (0x23, 0x06b),
    (0x24, 0x066),
    (0x25, 0x069),
    (0x26, 0x067),
    (0x27, 0x06a),
    (0x28, 0x06c),
    (0x29, 0x161),
    (0x2a, 0x0d2),
    (0x2b, 0x01c),
    (0x2c, 0x063),
    (0x2d, 0x06e),
    (0x2e, 0x06f),
    (0x2f, 0x08a),
    (0x30, 0x00b),
    (0x31, 0x002),
    (0x32, 0x003),
    (0x33, 0x004),
    (0x34, 0x005),
    (0x35, 0x006),
    (0x36, 0x007),
    (0x37, 0x008),
    (0x38, 0x009),
    (0x39, 0x00a),
    (0x41, 0x01e),
    (0x42, 0x030),
    (0x43, 0x02e),
    (0x44, 0x020),
    (0x45, 0x012),
    (0x46, 0x021),
    (0x47, 0x022),
    (0x48, 0x023),
    (0x49, 0x017),
    (0x4a, 0x024),
    (0x4b, 0x025),
    (0x4c, 0x026),
    (0x4d, 0x032),
    (0x4e, 0x031),
    (0x4f, 0x018),
    (0x50, 0x019),
    (0x51, 0x010),
    (0x52, 0x013),
    (0x53, 0x01f),
    (0x54, 0x014),
    (0x55, 0x016),
    (0x56, 0x02f),
    (0x57, 0x011),
    (0x58, 0x02d),
    (0x59, 0x015),
    (0x5a, 0x02c),
    (0x5b, 0x07d),
    (0x5c, 0x07e),
    (0x5d, 0x08b),
    (0x5f, 0x08e),
    (0x60, 0x052),
    (0x61, 0x04f),
    (0x62, 0x050),
    (0x63, 0x051),
    (0x64, 0x04b),
    (0x65, 0x04c),
    (0x66, 0x04d),
    (0x67, 0x047),
    (0x68, 0x048),
    (0x69, 0x049),
    (0x6a, 0x037),
    (0x6b, 0x04e),
    (0x6c, 0x060),
    (0x6d, 0x04a),
    (0x6e, 0x053),
    (0x6f, 0x062),
    (0x70, 0x03b),
    (0x71, 0x03c),
    (0x72, 0x03d),
    (0x73, 0x03e),
    (0x74, 0x03f),
    (0x75, 0x040),
    (0x76, 0x041),
    (0x77, 0x042),
    (0x78, 0x043),
    (0x79, 0x044),
    (0x7a, 0x057),
    (0x7b, 0x058),
    (0x7c, 0x0b7),
    (0x7d, 0x0b8),
    (0x7e, 0x0b9),
    (0x7f, 0x0ba),
    (0x80, 0x0bb),
    (0x81, 0x0bc),
    (0x82, 0x0bd),
    (0x83, 0x0be),
    (0x84, 0x0bf),
    (0x85, 0x0c0),
    (0x86, 0x0c0),
    (0x87, 0x0c2),
    (0x90, 0x045),
    (0x91, 0x046),
    (0xa0, 0x02a),
    (0xa1, 0x036),
    (0xa2, 0x01d),
    (0xa3, 0x061),
    (0xa4, 0x07d),
    (0xa5, 0x07e),
    (0xa6, 0x09e),
    (0xa7, 0x09f),
    (0xa8, 0x0ad),
    (0xa9, 0x080),
    (0xaa, 0x0d9),
    (0xab, 0x16c),
    (0xac, 0x096),
    (0xad, 0x071),
    (0xae, 0x072),
    (0xaf, 0x073),
    (0xb0, 0x0a3),
    (0xb1, 0x0a5),
    (0xb2, 0x0a6),
    (0xb3, 0x0a4),
    (0xb4, 0x09b),
    (0xb5, 0x161),
    (0xb6, 0x094),
    (0xb7, 0x095),
    (0xba, 0x027),
    (0xbb, 0x00d),
    (0xbc, 0x033),
    (0xbd, 0x00c),
    (0xbe, 0x034),
    (0xbf, 0x035),
    (0xc0, 0x028),
    (0xdb, 0x01a),
    (0xdc, 0x056),
    (0xdd, 0x01b),
    (0xde, 0x02b),
    (0xdf, 0x077),
    (0xe2, 0x02b),
    (0xf9, 0x0de),
    (0xfa, 0x0cf),
    (0xfb, 0x174),
    (0xfd, 0x19b),
    (0xfe, 0x163),
    (0xff, 0x0b9),
];

/// macOS virtual keycode (`kVK_*`) to evdev key code.
pub(crate) static MAC_KEYCODES: &[(u16, u16)] = &[
    (0x00, 0x01e),
    (0x01, 0x01f),
    (0x02, 0x020),
    (0x03, 0x021),
    (0x04, 0x023),
    (0x05, 0x022),
    (0x06, 0x02c),
    (0x07, 0x02d),
    (0x08, 0x02e),
    (0x09, 0x02f),
    (0x0b, 0x030),
    (0x0c, 0x010),
    (0x0d, 0x011),
    (0x0e, 0x012),
    (0x0f, 0x021),
    (0x10, 0x015),
    (0x11, 0x014),
    (0x12, 0x002),
    (0x13, 0x003),
    (0x14, 0x004),
    (0x15, 0x005),
    (0x16, 0x007),
    (0x17, 0x006),
    (0x18, 0x00d),
    (0x19, 0x00a),
    (0x1a, 0x008),
    (0x1b, 0x00c),
    (0x1c, 0x009),
    (0x1d, 0x00b),
    (0x1e, 0x01b),
    (0x1f, 0x018),
    (0x20, 0x016),
    (0x21, 0x01a),
    (0x22, 0x017),
    (0x23, 0x019),
    (0x25, 0x026),
    (0x26, 0x024),
    (0x27, 0x028),
    (0x28, 0x025),
    (0x29, 0x027),
    (0x2a, 0x02b),
    (0x2b, 0x033),
    (0x2c, 0x035),
    (0x2d, 0x031),
    (0x2e, 0x032),
    (0x2f, 0x034),
    (0x32, 0x029),
    (0x41, 0x053),
    (0x43, 0x037),
    (0x45, 0x04e),
    (0x47, 0x045),
    (0x4b, 0x062),
    (0x4c, 0x060),
    (0x4e, 0x04a),
    (0x51, 0x075),
    (0x52, 0x052),
    (0x53, 0x04f),
    (0x54, 0x050),
    (0x55, 0x051),
    (0x56, 0x04b),
    (0x57, 0x04c),
    (0x58, 0x04d),
    (0x59, 0x047),
    (0x5b, 0x048),
    (0x5c, 0x049),
    (0x24, 0x01c),
    (0x30, 0x00f),
    (0x31, 0x039),
    (0x33, 0x06f),
    (0x35, 0x001),
    (0x37, 0x07d),
    (0x38, 0x02a),
    (0x39, 0x03a),
    (0x3a, 0x038),
    (0x3b, 0x01d),
    (0x3c, 0x036),
    (0x3d, 0x064),
    (0x3e, 0x07e),
    (0x36, 0x07e),
    (0x3f, 0x1d0),
    (0x40, 0x0bb),
    (0x48, 0x073),
    (0x49, 0x072),
    (0x4a, 0x071),
    (0x4f, 0x0bc),
    (0x50, 0x0bd),
    (0x5a, 0x0be),
    (0x60, 0x03f),
    (0x61, 0x040),
    (0x62, 0x041),
    (0x63, 0x03d),
    (0x64, 0x042),
    (0x65, 0x043),
    (0x67, 0x057),
    (0x69, 0x0b7),
    (0x6a, 0x0ba),
    (0x6b, 0x0b8),
    (0x6d, 0x044),
    (0x6f, 0x058),
    (0x71, 0x0b9),
    (0x72, 0x08a),
    (0x73, 0x066),
    (0x74, 0x068),
    (0x75, 0x06f),
    (0x76, 0x03e),
    (0x77, 0x06b),
    (0x78, 0x03c),
    (0x79, 0x06d),
    (0x7a, 0x03b),
    (0x7b, 0x069),
    (0x7c, 0x06a),
    (0x7d, 0x06c),
    (0x7e, 0x067),
    (0x0a, 0x0aa),
    (0x5d, 0x07c),
    (0x5e, 0x05c),
    (0x5f, 0x05f),
    (0x66, 0x05e),
    (0x68, 0x05a),
];
